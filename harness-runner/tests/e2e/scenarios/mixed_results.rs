//! sim2h run with one passing and one failing scenario.

use harness_core::scenario::ScenarioOutcome;
use harness_core::transport::NETWORK_TYPE_ENV;
use harness_runner::suites::Suite;

use crate::helpers::harness::TestHarness;
use crate::helpers::scenarios::pass_and_fail;

#[tokio::test]
async fn test_e2e_sim2h_mixed_results_complete() {
    let out = TestHarness::new()
        .env(NETWORK_TYPE_ENV, "sim2h")
        .suite(Suite::new("mixed", pass_and_fail))
        .run()
        .await;

    assert_eq!(out.exit.exit_code(), 0);
    let stats = out.exit.stats().expect("run should complete");
    assert_eq!(stats.passed(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(
        stats.report("fails").map(|r| r.outcome.clone()),
        Some(ScenarioOutcome::Failed {
            reason: "arithmetic: expected 2, got 1".to_owned()
        })
    );

    assert!(out.console.contains("Registered 2 scenarios (at least 1 were expected)"));
    assert!(out.console.ends_with("All done.\n"));
    assert!(out.tap.contains("ok 1 passes\n"));
    assert!(out.tap.contains("not ok 2 fails\n"));
    assert!(out.tap.ends_with("1..2\n# pass 1\n# fail 1\n"));
}

#[tokio::test]
async fn test_e2e_failures_do_not_change_exit_code() {
    for network_type in ["memory", "websocket", "sim1h"] {
        let out = TestHarness::new()
            .env(NETWORK_TYPE_ENV, network_type)
            .suite(Suite::new("mixed", pass_and_fail))
            .run()
            .await;
        assert_eq!(out.exit.exit_code(), 0, "{network_type}");
        assert_eq!(out.exit.stats().map(|s| s.failed()), Some(1));
    }
}
