//! Hanging and panicking scenarios are contained; the run continues.

use std::time::Duration;

use harness_core::scenario::ScenarioOutcome;
use harness_core::transport::NETWORK_TYPE_ENV;
use harness_runner::suites::Suite;

use crate::helpers::harness::TestHarness;
use crate::helpers::scenarios::{hang_then_pass, panic_then_pass};

#[tokio::test]
async fn test_e2e_hard_timeout_cancels_and_continues() {
    let out = TestHarness::new()
        .env(NETWORK_TYPE_ENV, "memory")
        .timeouts(Duration::from_millis(50), Duration::from_millis(150))
        .suite(Suite::new("hang", hang_then_pass))
        .run()
        .await;

    assert_eq!(out.exit.exit_code(), 0);
    let stats = out.exit.stats().expect("run should complete");
    assert_eq!(
        stats.report("hangs").map(|r| r.outcome.clone()),
        Some(ScenarioOutcome::TimedOut { after_ms: 150 })
    );
    assert_eq!(
        stats.report("after hang").map(|r| r.outcome.clone()),
        Some(ScenarioOutcome::Passed)
    );
    assert!(out.tap.contains("#   timed out after 150ms"));
}

#[tokio::test]
async fn test_e2e_panic_is_recorded_and_run_continues() {
    let out = TestHarness::new()
        .env(NETWORK_TYPE_ENV, "sim1h")
        .suite(Suite::new("panic", panic_then_pass))
        .run()
        .await;

    assert_eq!(out.exit.exit_code(), 0);
    let stats = out.exit.stats().expect("run should complete");
    assert!(matches!(
        stats.report("panics").map(|r| &r.outcome),
        Some(ScenarioOutcome::Panicked { reason }) if reason.contains("index out of bounds")
    ));
    assert_eq!(
        stats.report("after panic").map(|r| r.outcome.clone()),
        Some(ScenarioOutcome::Passed)
    );
    assert!(out.console.ends_with("All done.\n"));
}
