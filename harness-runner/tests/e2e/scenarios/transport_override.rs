//! Override file decides the transport, and with it the middleware stack.

use std::io::Write;

use harness_core::transport::{NETWORK_TYPE_ENV, TRANSPORT_OVERRIDE_ENV};
use harness_runner::suites::Suite;

use crate::helpers::harness::TestHarness;
use crate::helpers::scenarios::expects_single_conductor;

#[tokio::test]
async fn test_e2e_memory_override_collapses_to_single_conductor() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("tempfile");
    write!(file, r#"{{"type": "memory"}}"#).expect("write");
    let path = file.path().to_string_lossy().into_owned();

    let out = TestHarness::new()
        .env(NETWORK_TYPE_ENV, "sim2h")
        .env(TRANSPORT_OVERRIDE_ENV, &path)
        .suite(Suite::new("single", expects_single_conductor))
        .run()
        .await;

    let stats = out.exit.stats().expect("run should complete");
    assert!(stats.all_passed(), "{}", out.tap);
}

#[tokio::test]
async fn test_e2e_unreadable_override_exits_one() {
    let out = TestHarness::new()
        .env(TRANSPORT_OVERRIDE_ENV, "/nonexistent/override.toml")
        .suite(Suite::new("single", expects_single_conductor))
        .run()
        .await;

    assert_eq!(out.exit.exit_code(), 1);
    assert!(out.exit.stats().is_none());
    assert!(out.diagnostics.contains("config file not found"));
    assert!(out.tap.is_empty());
}

#[tokio::test]
async fn test_e2e_malformed_override_exits_one() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("tempfile");
    write!(file, "{{not json").expect("write");
    let path = file.path().to_string_lossy().into_owned();

    let out = TestHarness::new()
        .env(TRANSPORT_OVERRIDE_ENV, &path)
        .suite(Suite::new("single", expects_single_conductor))
        .run()
        .await;

    assert_eq!(out.exit.exit_code(), 1);
    assert!(out.diagnostics.contains("failed to parse config"));
}
