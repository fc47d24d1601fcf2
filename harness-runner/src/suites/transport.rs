//! Smoke checks that the session reflects the resolved transport.

use harness_core::error::HarnessError;
use harness_core::scenario::{Registrar, scenario_fn};
use harness_core::session::{CallMode, SyncVariant, Topology};
use harness_core::transport::TransportKind;

pub fn register(registrar: &mut dyn Registrar) -> Result<(), HarnessError> {
    registrar.register_scenario(
        "transport: session reports the resolved transport",
        scenario_fn(|session, t| async move {
            let transport = session.transport();
            let json = serde_json::to_value(transport)
                .map_err(|e| harness_core::ScenarioError::Failed(e.to_string()))?;
            t.equal(
                json["type"].as_str(),
                Some(transport.kind().to_string().as_str()),
                "serialized transport tag",
            );
            Ok(())
        }),
    )?;

    registrar.register_scenario(
        "transport: middleware matches transport kind",
        scenario_fn(|session, t| async move {
            let settings = session.settings();
            let kind = session.transport().kind();

            let expected_topology = match kind {
                TransportKind::Memory => Topology::Single,
                _ => Topology::PerPlayer,
            };
            t.equal(settings.topology, expected_topology, "topology");

            let expected_call = match kind {
                TransportKind::Memory | TransportKind::Sim2h => {
                    CallMode::Sync(SyncVariant::Middleware)
                }
                TransportKind::Websocket | TransportKind::Sim1h => {
                    CallMode::Sync(SyncVariant::Direct)
                }
            };
            t.equal(settings.call_mode, expected_call, "call mode");
            Ok(())
        }),
    )?;

    Ok(())
}
