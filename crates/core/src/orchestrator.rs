//! Scenario execution.
//!
//! [`Orchestrator`] owns the registry while scenarios are being registered and
//! hands it to an [`ExecutionContext`] to run. Each scenario goes through:
//!
//! 1. pipeline `enter` (stages adjust the session settings)
//! 2. the body, spawned as its own task
//! 3. soft timeout: warn once, keep waiting
//! 4. hard timeout: abort the task, outcome `TimedOut`
//! 5. panic: caught from the `JoinError`, logged, outcome `Panicked`
//! 6. pipeline `exit` (innermost stage first)
//! 7. conductor teardown
//!
//! A failing, hanging or panicking scenario never stops the run.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::conductor::ConductorBackend;
use crate::config::{ConductorLoggerConfig, HarnessConfig, WaiterConfig};
use crate::error::HarnessError;
use crate::metrics as m;
use crate::middleware::{MiddlewarePipeline, ScenarioContext, TapReporter};
use crate::scenario::{
    Registrar, RunStats, ScenarioEntry, ScenarioFn, ScenarioOutcome, ScenarioRegistry,
    ScenarioReport,
};
use crate::session::Session;
use crate::transport::TransportConfig;

/// Everything needed to run scenarios.
pub struct ExecutionContext {
    transport: TransportConfig,
    pipeline: MiddlewarePipeline,
    waiter: WaiterConfig,
    logger: ConductorLoggerConfig,
    backend: Arc<dyn ConductorBackend>,
}

impl ExecutionContext {
    pub fn new(
        transport: TransportConfig,
        pipeline: MiddlewarePipeline,
        waiter: WaiterConfig,
        logger: ConductorLoggerConfig,
        backend: Arc<dyn ConductorBackend>,
    ) -> Self {
        Self {
            transport,
            pipeline,
            waiter,
            logger,
            backend,
        }
    }

    /// Build the context for a resolved transport.
    ///
    /// The middleware stack is derived from the transport actually in use, so
    /// an override file also decides the stack.
    pub fn from_config(
        transport: TransportConfig,
        config: &HarnessConfig,
        backend: Arc<dyn ConductorBackend>,
        reporter: TapReporter,
    ) -> Self {
        let pipeline = MiddlewarePipeline::build_with_reporter(
            transport.kind(),
            config.consistency_strategy(),
            reporter,
        );
        Self::new(
            transport,
            pipeline,
            config.waiter.clone(),
            config.logger.clone(),
            backend,
        )
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    pub fn waiter(&self) -> &WaiterConfig {
        &self.waiter
    }

    /// Run the entries sequentially, then let every stage see the totals.
    pub async fn run_entries(&self, entries: Vec<ScenarioEntry>) -> RunStats {
        metrics::gauge!(m::SCENARIOS_REGISTERED).set(entries.len() as f64);
        info!(
            scenarios = entries.len(),
            transport = %self.transport.kind(),
            stages = ?self.pipeline.names(),
            "starting scenario run"
        );

        let mut stats = RunStats::default();
        for (index, entry) in entries.into_iter().enumerate() {
            let report = self.run_one(index, entry).await;
            stats.reports.push(report);
        }

        self.pipeline.finish(&stats);
        info!(
            total = stats.total(),
            passed = stats.passed(),
            failed = stats.failed(),
            "scenario run finished"
        );
        stats
    }

    async fn run_one(&self, index: usize, entry: ScenarioEntry) -> ScenarioReport {
        let mut ctx = ScenarioContext::new(entry.name.clone(), index);
        self.pipeline.enter(&mut ctx);

        let session = Session::new(
            entry.name.clone(),
            self.transport.clone(),
            ctx.settings,
            self.logger.clone(),
            Arc::clone(&self.backend),
        );

        info!(scenario = %entry.name, index, "scenario started");
        let started = Instant::now();
        let handle = tokio::spawn((entry.body)(session.clone(), ctx.assertions.clone()));
        let mut outcome = self.await_body(&entry.name, handle).await;
        let duration = started.elapsed();

        self.pipeline.exit(&ctx, &mut outcome);
        session.teardown().await;

        let assertions = ctx.assertions.snapshot();
        metrics::counter!(
            m::SCENARIOS_FINISHED_TOTAL,
            m::LABEL_OUTCOME => outcome.label(),
            m::LABEL_TRANSPORT => self.transport.kind().to_string()
        )
        .increment(1);
        metrics::histogram!(m::SCENARIO_DURATION_SECONDS).record(duration.as_secs_f64());
        metrics::counter!(m::ASSERTIONS_FAILED_TOTAL).increment(assertions.failures.len() as u64);

        if outcome.is_pass() {
            info!(
                scenario = %entry.name,
                duration_ms = duration.as_millis() as u64,
                "scenario passed"
            );
        } else {
            warn!(
                scenario = %entry.name,
                duration_ms = duration.as_millis() as u64,
                outcome = %outcome,
                "scenario did not pass"
            );
        }

        ScenarioReport {
            name: entry.name,
            outcome,
            duration,
            assertions_passed: assertions.passed,
            assertions_failed: assertions.failures.len(),
        }
    }

    async fn await_body(
        &self,
        name: &str,
        mut handle: JoinHandle<Result<(), HarnessError>>,
    ) -> ScenarioOutcome {
        let soft = self.waiter.soft_timeout();
        let hard = self.waiter.hard_timeout();

        let joined = tokio::select! {
            joined = &mut handle => joined,
            _ = tokio::time::sleep(soft) => {
                warn!(
                    scenario = %name,
                    soft_timeout_ms = self.waiter.soft_timeout_ms,
                    "scenario still running after soft timeout"
                );
                metrics::counter!(m::SCENARIO_SOFT_TIMEOUTS_TOTAL).increment(1);

                let remaining = tokio::time::timeout(hard.saturating_sub(soft), &mut handle).await;
                match remaining {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        // Wait for the abort so the body's resources are dropped
                        // before teardown.
                        let _ = handle.await;
                        error!(
                            scenario = %name,
                            hard_timeout_ms = self.waiter.hard_timeout_ms,
                            "scenario cancelled at hard timeout"
                        );
                        return ScenarioOutcome::TimedOut {
                            after_ms: self.waiter.hard_timeout_ms,
                        };
                    }
                }
            }
        };

        match joined {
            Ok(Ok(())) => ScenarioOutcome::Passed,
            Ok(Err(e)) => {
                warn!(scenario = %name, error = %e, "scenario returned an error");
                ScenarioOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => join_failure(name, e),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("transport", &self.transport)
            .field("pipeline", &self.pipeline)
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

fn join_failure(name: &str, e: JoinError) -> ScenarioOutcome {
    if e.is_panic() {
        let reason = panic_message(e.into_panic());
        error!(scenario = %name, reason = %reason, "scenario panicked");
        ScenarioOutcome::Panicked { reason }
    } else {
        error!(scenario = %name, error = %e, "scenario task cancelled");
        ScenarioOutcome::Failed {
            reason: e.to_string(),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Collects scenarios, then runs them.
#[derive(Debug)]
pub struct Orchestrator {
    registry: ScenarioRegistry,
    context: ExecutionContext,
}

impl Orchestrator {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            registry: ScenarioRegistry::new(),
            context,
        }
    }

    pub fn num_registered(&self) -> usize {
        self.registry.count()
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Run every registered scenario once.
    pub async fn run(self) -> RunStats {
        let Self { registry, context } = self;
        registry.run_all(&context).await
    }
}

impl Registrar for Orchestrator {
    fn register_scenario(&mut self, name: &str, body: ScenarioFn) -> Result<(), HarnessError> {
        self.registry.register(name, body)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::conductor::{CallRequest, MemoryBackend, ZomeHandler};
    use crate::error::ScenarioError;
    use crate::middleware::SharedBuffer;
    use crate::scenario::scenario_fn;
    use crate::session::{CallMode, SyncVariant, Topology};

    fn orchestrator(transport: TransportConfig) -> (Orchestrator, SharedBuffer) {
        let (reporter, buffer) = TapReporter::buffered();
        let backend = Arc::new(MemoryBackend::new().with_publish_delay(Duration::ZERO));
        let context =
            ExecutionContext::from_config(transport, &HarnessConfig::default(), backend, reporter);
        (Orchestrator::new(context), buffer)
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let (mut orch, buffer) = orchestrator(TransportConfig::Memory);
        for name in ["first", "second", "third"] {
            orch.register_scenario(name, scenario_fn(|_s, t| async move {
                t.ok(true, "ran");
                Ok(())
            }))
            .unwrap();
        }
        assert_eq!(orch.num_registered(), 3);

        let stats = orch.run().await;
        let names: Vec<_> = stats.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(stats.all_passed());

        let out = buffer.contents();
        assert!(out.contains("ok 1 first\n"));
        assert!(out.contains("ok 3 third\n"));
        assert!(out.ends_with("1..3\n# pass 3\n# fail 0\n"));
    }

    #[tokio::test]
    async fn memory_sessions_share_one_conductor() {
        let (mut orch, _buffer) = orchestrator(TransportConfig::Memory);
        orch.register_scenario(
            "shared",
            scenario_fn(|s, t| async move {
                let players = s.players(&["alice", "bob"]).await?;
                t.equal(players[0].conductor_name(), players[1].conductor_name(), "same conductor");
                t.equal(s.settings().topology, Topology::Single, "topology");
                t.equal(
                    s.settings().call_mode,
                    CallMode::Sync(SyncVariant::Middleware),
                    "call mode",
                );
                let reply = players[0].call("chat", "post", json!("hi")).await?;
                t.equal(reply, json!({"Ok": "hi"}), "echo");
                Ok(())
            }),
        )
        .unwrap();

        let stats = orch.run().await;
        assert!(stats.all_passed(), "{:?}", stats.reports);
        assert_eq!(stats.reports[0].assertions_passed, 4);
    }

    #[tokio::test]
    async fn sim2h_sessions_use_gated_calls() {
        let (mut orch, _buffer) = orchestrator(TransportConfig::default_sim2h());
        orch.register_scenario(
            "gated",
            scenario_fn(|s, t| async move {
                let players = s.players(&["alice", "bob"]).await?;
                t.not_equal(players[0].conductor_name(), players[1].conductor_name(), "own conductors");
                t.equal(
                    s.settings().call_mode,
                    CallMode::Sync(SyncVariant::Middleware),
                    "call mode",
                );
                Ok(())
            }),
        )
        .unwrap();
        assert!(orch.run().await.all_passed());
    }

    #[tokio::test]
    async fn assertion_and_body_failures_do_not_stop_the_run() {
        let (mut orch, buffer) = orchestrator(TransportConfig::Memory);
        orch.register_scenario("asserts", scenario_fn(|_s, t| async move {
            t.ok(false, "nope");
            Ok(())
        }))
        .unwrap();
        orch.register_scenario("errors", scenario_fn(|_s, _t| async move {
            Err(ScenarioError::Failed("body gave up".to_owned()).into())
        }))
        .unwrap();
        orch.register_scenario("fine", scenario_fn(|_s, _t| async { Ok(()) }))
            .unwrap();

        let stats = orch.run().await;
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.passed(), 1);
        assert_eq!(
            stats.report("asserts").map(|r| r.outcome.clone()),
            Some(ScenarioOutcome::Failed {
                reason: "nope".to_owned()
            })
        );
        assert!(matches!(
            stats.report("errors").map(|r| &r.outcome),
            Some(ScenarioOutcome::Failed { reason }) if reason.contains("body gave up")
        ));
        assert!(buffer.contents().contains("not ok 2 errors\n"));
    }

    #[tokio::test]
    async fn panicking_scenario_is_recorded_and_run_continues() {
        let (mut orch, _buffer) = orchestrator(TransportConfig::Memory);
        orch.register_scenario("explodes", scenario_fn(|_s, _t| async move {
            panic!("kaboom");
        }))
        .unwrap();
        orch.register_scenario("after", scenario_fn(|_s, _t| async { Ok(()) }))
            .unwrap();

        let stats = orch.run().await;
        assert_eq!(
            stats.report("explodes").map(|r| r.outcome.clone()),
            Some(ScenarioOutcome::Panicked {
                reason: "kaboom".to_owned()
            })
        );
        assert_eq!(
            stats.report("after").map(|r| r.outcome.clone()),
            Some(ScenarioOutcome::Passed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn soft_timeout_only_warns() {
        let logs = SharedBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (mut orch, _buffer) = orchestrator(TransportConfig::Memory);
        orch.register_scenario("slow", scenario_fn(|_s, _t| async {
            tokio::time::sleep(Duration::from_millis(7_000)).await;
            Ok(())
        }))
        .unwrap();
        orch.register_scenario("quick", scenario_fn(|_s, _t| async { Ok(()) }))
            .unwrap();

        let stats = orch.run().await;
        assert_eq!(stats.reports[0].outcome, ScenarioOutcome::Passed);
        assert_eq!(stats.reports[1].outcome, ScenarioOutcome::Passed);

        let logs = logs.contents();
        assert_eq!(
            logs.matches("scenario still running after soft timeout").count(),
            1,
            "{logs}"
        );
        assert!(logs.contains("scenario=slow"), "{logs}");
        assert!(logs.contains("soft_timeout_ms=5000"), "{logs}");
        assert!(!logs.contains("cancelled at hard timeout"), "{logs}");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_zome_handler_fails_scenario_before_timeout() {
        let (reporter, _buffer) = TapReporter::buffered();
        let handler: ZomeHandler =
            Arc::new(|_req: &CallRequest| -> Result<Value, String> { panic!("zome exploded") });
        let backend = Arc::new(MemoryBackend::new().with_handler(handler));
        let context = ExecutionContext::from_config(
            TransportConfig::Memory,
            &HarnessConfig::default(),
            backend,
            reporter,
        );
        let mut orch = Orchestrator::new(context);
        orch.register_scenario("explodes", scenario_fn(|s, _t| async move {
            let alice = s.player("alice").await?;
            alice.call("chat", "post", json!("hi")).await?;
            Ok(())
        }))
        .unwrap();

        let started = tokio::time::Instant::now();
        let stats = orch.run().await;
        assert!(started.elapsed() < Duration::from_millis(5_000));
        match &stats.reports[0].outcome {
            ScenarioOutcome::Failed { reason } => {
                assert!(reason.contains("zome exploded"), "{reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hard_timeout_cancels_scenario() {
        let (mut orch, _buffer) = orchestrator(TransportConfig::Memory);
        orch.register_scenario("hangs", scenario_fn(|_s, _t| async {
            std::future::pending::<()>().await;
            Ok(())
        }))
        .unwrap();
        orch.register_scenario("next", scenario_fn(|_s, _t| async { Ok(()) }))
            .unwrap();

        let started = tokio::time::Instant::now();
        let stats = orch.run().await;
        assert!(started.elapsed() >= Duration::from_millis(10_000));
        assert_eq!(
            stats.reports[0].outcome,
            ScenarioOutcome::TimedOut { after_ms: 10_000 }
        );
        assert_eq!(stats.reports[1].outcome, ScenarioOutcome::Passed);
    }

    #[tokio::test]
    async fn fixed_delay_consistency_from_config() {
        let mut config = HarnessConfig::default();
        config.run.consistency = crate::config::ConsistencyMode::FixedDelay;
        config.run.fixed_delay_ms = 5;
        let (reporter, _buffer) = TapReporter::buffered();
        let context = ExecutionContext::from_config(
            TransportConfig::Memory,
            &config,
            Arc::new(MemoryBackend::new()),
            reporter,
        );
        assert!(context.pipeline().contains("dumb-waiter"));
    }

    #[test]
    fn panic_message_variants() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "non-string panic payload");
    }
}
