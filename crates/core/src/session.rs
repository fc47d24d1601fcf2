//! Per-scenario session and assertion handles.
//!
//! A [`Session`] is handed to every scenario body. It spawns players on
//! conductors according to the [`SessionSettings`] the middleware stages
//! produced, routes their calls through the selected call mode, and implements
//! the consistency wait.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::conductor::{AgentInfo, CallRequest, Conductor, ConductorBackend, ConductorSpec};
use crate::config::ConductorLoggerConfig;
use crate::error::HarnessError;
use crate::metrics as m;
use crate::transport::TransportConfig;

/// Name of the shared conductor under the single-conductor topology.
pub const SHARED_CONDUCTOR_NAME: &str = "shared";

/// How players map onto conductors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One conductor per player
    PerPlayer,
    /// All players share one in-process conductor
    Single,
}

/// How a synchronous call is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVariant {
    /// The conductor's native synchronous call
    Direct,
    /// Asynchronous call behind a one-at-a-time gate, then settle
    Middleware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Return as soon as the conductor answered
    Async,
    Sync(SyncVariant),
}

/// What `Session::consistency()` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyWait {
    /// Wait for every conductor of the session to settle
    Settle,
    /// Sleep for a fixed interval
    FixedDelay(Duration),
}

/// Settings assembled by the middleware stages before a scenario runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub topology: Topology,
    pub call_mode: CallMode,
    pub consistency: ConsistencyWait,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            topology: Topology::PerPlayer,
            call_mode: CallMode::Async,
            consistency: ConsistencyWait::Settle,
        }
    }
}

/// Handle given to a scenario body.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    scenario: String,
    transport: TransportConfig,
    settings: SessionSettings,
    logger: ConductorLoggerConfig,
    backend: Arc<dyn ConductorBackend>,
    conductors: tokio::sync::Mutex<Vec<Arc<dyn Conductor>>>,
    call_gate: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(
        scenario: impl Into<String>,
        transport: TransportConfig,
        settings: SessionSettings,
        logger: ConductorLoggerConfig,
        backend: Arc<dyn ConductorBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                scenario: scenario.into(),
                transport,
                settings,
                logger,
                backend,
                conductors: tokio::sync::Mutex::new(Vec::new()),
                call_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn scenario_name(&self) -> &str {
        &self.inner.scenario
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.inner.transport
    }

    pub fn settings(&self) -> SessionSettings {
        self.inner.settings
    }

    /// Spawn (or reuse) conductors and install one agent per name.
    pub async fn players(&self, names: &[&str]) -> Result<Vec<Player>, HarnessError> {
        let mut players = Vec::with_capacity(names.len());
        for name in names {
            let conductor = self.conductor_for(name).await?;
            let agent = conductor.add_agent(name).await?;
            tracing::debug!(
                scenario = %self.inner.scenario,
                player = %name,
                conductor = %conductor.name(),
                "player ready"
            );
            players.push(Player {
                agent,
                conductor,
                session: Arc::clone(&self.inner),
            });
        }
        Ok(players)
    }

    /// Single-player shorthand for [`Session::players`].
    pub async fn player(&self, name: &str) -> Result<Player, HarnessError> {
        let mut players = self.players(&[name]).await?;
        players.pop().ok_or_else(|| {
            crate::error::ScenarioError::Failed(format!("player '{name}' was not created")).into()
        })
    }

    /// Wait until the effects of earlier calls are visible to every player.
    pub async fn consistency(&self) {
        match self.inner.settings.consistency {
            ConsistencyWait::FixedDelay(interval) => {
                tracing::debug!(
                    scenario = %self.inner.scenario,
                    interval_ms = interval.as_millis() as u64,
                    "fixed-delay consistency wait"
                );
                tokio::time::sleep(interval).await;
            }
            ConsistencyWait::Settle => {
                let conductors = self.inner.conductors.lock().await.clone();
                for conductor in conductors {
                    conductor.settle().await;
                }
            }
        }
    }

    /// Number of conductors spawned so far.
    pub async fn conductor_count(&self) -> usize {
        self.inner.conductors.lock().await.len()
    }

    /// Shut down every conductor of this session. Errors are logged.
    pub async fn teardown(&self) {
        let conductors: Vec<_> = self.inner.conductors.lock().await.drain(..).collect();
        for conductor in conductors {
            if let Err(e) = conductor.shutdown().await {
                tracing::warn!(
                    scenario = %self.inner.scenario,
                    conductor = %conductor.name(),
                    error = %e,
                    "conductor shutdown failed"
                );
            }
        }
    }

    async fn conductor_for(&self, player: &str) -> Result<Arc<dyn Conductor>, HarnessError> {
        let mut conductors = self.inner.conductors.lock().await;
        let name = match self.inner.settings.topology {
            Topology::Single => SHARED_CONDUCTOR_NAME.to_owned(),
            Topology::PerPlayer => format!("conductor-{player}"),
        };
        if let Some(existing) = conductors.iter().find(|c| c.name() == name) {
            return Ok(Arc::clone(existing));
        }

        let conductor = self
            .inner
            .backend
            .spawn(ConductorSpec {
                name,
                transport: self.inner.transport.clone(),
                logger: self.inner.logger.clone(),
            })
            .await?;
        metrics::counter!(m::CONDUCTORS_SPAWNED_TOTAL).increment(1);
        conductors.push(Arc::clone(&conductor));
        Ok(conductor)
    }
}

/// An agent inside a session.
pub struct Player {
    agent: AgentInfo,
    conductor: Arc<dyn Conductor>,
    session: Arc<SessionInner>,
}

impl Player {
    pub fn name(&self) -> &str {
        &self.agent.name
    }

    pub fn address(&self) -> &str {
        &self.agent.address
    }

    /// Name of the conductor hosting this player.
    pub fn conductor_name(&self) -> &str {
        self.conductor.name()
    }

    /// Call a zome function as this player, honoring the session's call mode.
    pub async fn call(&self, zome: &str, func: &str, payload: Value) -> Result<Value, HarnessError> {
        let request = CallRequest {
            agent: self.agent.name.clone(),
            zome: zome.to_owned(),
            func: func.to_owned(),
            payload,
        };
        match self.session.settings.call_mode {
            CallMode::Async => self.conductor.call(request).await,
            CallMode::Sync(SyncVariant::Direct) => self.conductor.call_sync(request).await,
            CallMode::Sync(SyncVariant::Middleware) => {
                let _gate = self.session.call_gate.lock().await;
                let result = self.conductor.call(request).await;
                self.conductor.settle().await;
                result
            }
        }
    }
}

/// Result of the assertions made by one scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssertionLog {
    pub passed: usize,
    pub failures: Vec<String>,
}

/// Assertion handle given to a scenario body.
///
/// Failed assertions do not abort the body; the assertion adapter stage
/// turns them into a failed outcome afterwards.
#[derive(Clone, Default)]
pub struct Assertions {
    log: Arc<Mutex<AssertionLog>>,
}

impl Assertions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self, condition: bool, message: &str) -> bool {
        self.record(condition, || message.to_owned())
    }

    pub fn equal<T: PartialEq + Debug>(&self, actual: T, expected: T, message: &str) -> bool {
        let pass = actual == expected;
        self.record(pass, || {
            format!("{message}: expected {expected:?}, got {actual:?}")
        })
    }

    pub fn not_equal<T: PartialEq + Debug>(&self, actual: T, unexpected: T, message: &str) -> bool {
        let pass = actual != unexpected;
        self.record(pass, || format!("{message}: value should differ from {unexpected:?}"))
    }

    /// Record an unconditional pass.
    pub fn pass(&self, message: &str) {
        tracing::trace!(assertion = message, "pass");
        self.record(true, String::new);
    }

    pub fn fail(&self, message: &str) {
        self.record(false, || message.to_owned());
    }

    pub fn snapshot(&self) -> AssertionLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, pass: bool, failure: impl FnOnce() -> String) -> bool {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if pass {
            log.passed += 1;
        } else {
            log.failures.push(failure());
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::conductor::MemoryBackend;

    fn session(settings: SessionSettings) -> Session {
        Session::new(
            "test",
            TransportConfig::Memory,
            settings,
            ConductorLoggerConfig::default(),
            Arc::new(MemoryBackend::new().with_publish_delay(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn per_player_topology_spawns_one_conductor_each() {
        let session = session(SessionSettings::default());
        let players = session.players(&["alice", "bob"]).await.unwrap();
        assert_eq!(session.conductor_count().await, 2);
        assert_eq!(players[0].conductor_name(), "conductor-alice");
        assert_eq!(players[1].conductor_name(), "conductor-bob");
        session.teardown().await;
        assert_eq!(session.conductor_count().await, 0);
    }

    #[tokio::test]
    async fn single_topology_shares_one_conductor() {
        let session = session(SessionSettings {
            topology: Topology::Single,
            ..SessionSettings::default()
        });
        let players = session.players(&["alice", "bob", "carol"]).await.unwrap();
        assert_eq!(session.conductor_count().await, 1);
        assert!(players.iter().all(|p| p.conductor_name() == SHARED_CONDUCTOR_NAME));
        assert_ne!(players[0].address(), players[1].address());
    }

    #[tokio::test]
    async fn call_modes_return_the_same_answer() {
        for call_mode in [
            CallMode::Async,
            CallMode::Sync(SyncVariant::Direct),
            CallMode::Sync(SyncVariant::Middleware),
        ] {
            let session = session(SessionSettings {
                call_mode,
                ..SessionSettings::default()
            });
            let alice = session.player("alice").await.unwrap();
            let value = alice.call("chat", "post", json!("hi")).await.unwrap();
            assert_eq!(value, json!({"Ok": "hi"}), "{call_mode:?}");
            session.teardown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_consistency_sleeps() {
        let session = session(SessionSettings {
            consistency: ConsistencyWait::FixedDelay(Duration::from_millis(1_000)),
            ..SessionSettings::default()
        });
        let started = tokio::time::Instant::now();
        session.consistency().await;
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn settle_consistency_with_no_conductors_returns() {
        let session = session(SessionSettings::default());
        session.consistency().await;
    }

    #[test]
    fn assertions_record_passes_and_failures() {
        let t = Assertions::new();
        assert!(t.ok(true, "truthy"));
        assert!(t.equal(2, 2, "two"));
        assert!(!t.equal("a", "b", "letters"));
        assert!(!t.not_equal(1, 1, "ones"));
        t.fail("explicit");

        let log = t.snapshot();
        assert_eq!(log.passed, 2);
        assert_eq!(log.failures.len(), 3);
        assert_eq!(log.failures[0], "letters: expected \"b\", got \"a\"");
        assert_eq!(log.failures[2], "explicit");
    }

    #[test]
    fn assertion_clones_share_the_log() {
        let t = Assertions::new();
        let clone = t.clone();
        clone.ok(false, "from clone");
        assert_eq!(t.snapshot().failures, vec!["from clone".to_owned()]);
    }
}
