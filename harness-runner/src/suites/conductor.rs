//! Smoke checks against the conductor backend.

use serde_json::json;

use harness_core::error::HarnessError;
use harness_core::scenario::{Registrar, scenario_fn};

pub fn register(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "conductor: players answer calls",
        scenario_fn(|session, t| async move {
            let players = session.players(&["alice", "bob"]).await?;
            t.not_equal(players[0].address(), players[1].address(), "distinct agents");

            for player in &players {
                let reply = player
                    .call("smoke", "echo", json!({ "from": player.name() }))
                    .await?;
                t.equal(
                    reply,
                    json!({ "Ok": { "from": player.name() } }),
                    "echo reply",
                );
            }
            Ok(())
        }),
    )?;

    registrar.register_scenario(
        "conductor: consistency wait completes",
        scenario_fn(|session, t| async move {
            let alice = session.player("alice").await?;
            alice.call("smoke", "publish", json!("entry")).await?;
            session.consistency().await;
            t.pass("consistency reached");
            Ok(())
        }),
    )?;

    Ok(())
}
