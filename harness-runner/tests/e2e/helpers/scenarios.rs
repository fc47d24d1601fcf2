//! Scenario suites used across E2E tests.

use std::time::Duration;

use serde_json::json;

use harness_core::error::HarnessError;
use harness_core::scenario::{Registrar, scenario_fn};
use harness_core::session::Topology;

/// One passing and one failing scenario.
pub fn pass_and_fail(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "passes",
        scenario_fn(|session, t| async move {
            let alice = session.player("alice").await?;
            let reply = alice.call("posts", "create", json!({"title": "hello"})).await?;
            t.equal(reply, json!({"Ok": {"title": "hello"}}), "created");
            Ok(())
        }),
    )?;
    registrar.register_scenario(
        "fails",
        scenario_fn(|_session, t| async move {
            t.equal(1, 2, "arithmetic");
            Ok(())
        }),
    )
}

/// A scenario that never finishes, followed by a passing one.
#[allow(dead_code)]
pub fn hang_then_pass(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "hangs",
        scenario_fn(|_session, _t| async move {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        }),
    )?;
    registrar.register_scenario("after hang", scenario_fn(|_s, _t| async { Ok(()) }))
}

/// A scenario that panics, followed by a passing one.
#[allow(dead_code)]
pub fn panic_then_pass(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "panics",
        scenario_fn(|_session, t| async move {
            let items: Vec<u32> = Vec::new();
            t.equal(items[3], 0, "unreachable");
            Ok(())
        }),
    )?;
    registrar.register_scenario("after panic", scenario_fn(|_s, _t| async { Ok(()) }))
}

/// Asserts that every player shares the single in-process conductor.
#[allow(dead_code)]
pub fn expects_single_conductor(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "single conductor",
        scenario_fn(|session, t| async move {
            t.equal(session.settings().topology, Topology::Single, "topology");
            let players = session.players(&["alice", "bob"]).await?;
            t.equal(
                players[0].conductor_name(),
                players[1].conductor_name(),
                "shared conductor",
            );
            Ok(())
        }),
    )
}
