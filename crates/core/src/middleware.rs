//! Middleware pipeline wrapped around every scenario.
//!
//! The stack depends only on the transport kind and the consistency strategy:
//!
//! | kind | stages |
//! |---|---|
//! | memory | single-conductor, call-sync-middleware, tap-reporter |
//! | websocket | call-sync, tap-reporter |
//! | sim1h | call-sync, tap-reporter |
//! | sim2h | call-sync-middleware, tap-reporter |
//!
//! Under fixed-delay consistency a `dumb-waiter` stage sits in front of the
//! call-sync stage. The first stage is the outermost: `enter` runs front to
//! back, `exit` back to front.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::ConsistencyStrategy;
use crate::scenario::{RunStats, ScenarioOutcome};
use crate::session::{Assertions, CallMode, ConsistencyWait, SessionSettings, SyncVariant, Topology};
use crate::transport::TransportKind;

/// Per-scenario state the stages read and adjust.
#[derive(Clone)]
pub struct ScenarioContext {
    pub name: String,
    /// Zero-based position in the run
    pub index: usize,
    pub settings: SessionSettings,
    pub assertions: Assertions,
}

impl ScenarioContext {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            settings: SessionSettings::default(),
            assertions: Assertions::new(),
        }
    }
}

/// A stage of the pipeline.
///
/// All hooks default to no-ops.
pub trait MiddlewareStage: Send + Sync {
    fn name(&self) -> &str;

    /// Called before the scenario body runs.
    fn enter(&self, _ctx: &mut ScenarioContext) {}

    /// Called after the scenario body finished, timed out or panicked.
    fn exit(&self, _ctx: &ScenarioContext, _outcome: &mut ScenarioOutcome) {}

    /// Called once after every scenario ran.
    fn finish(&self, _stats: &RunStats) {}
}

/// Runs all players of a scenario inside one in-process conductor.
#[derive(Debug, Default)]
pub struct SingleConductor;

impl MiddlewareStage for SingleConductor {
    fn name(&self) -> &str {
        "single-conductor"
    }

    fn enter(&self, ctx: &mut ScenarioContext) {
        ctx.settings.topology = Topology::Single;
    }
}

/// Makes every player call synchronous.
#[derive(Debug)]
pub struct CallSync {
    variant: SyncVariant,
}

impl CallSync {
    pub fn direct() -> Self {
        Self {
            variant: SyncVariant::Direct,
        }
    }

    pub fn middleware() -> Self {
        Self {
            variant: SyncVariant::Middleware,
        }
    }

    pub fn variant(&self) -> SyncVariant {
        self.variant
    }
}

impl MiddlewareStage for CallSync {
    fn name(&self) -> &str {
        match self.variant {
            SyncVariant::Direct => "call-sync",
            SyncVariant::Middleware => "call-sync-middleware",
        }
    }

    fn enter(&self, ctx: &mut ScenarioContext) {
        ctx.settings.call_mode = CallMode::Sync(self.variant);
    }
}

/// Replaces the consistency wait with a fixed sleep.
#[derive(Debug)]
pub struct DumbWaiter {
    interval: Duration,
}

impl DumbWaiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl MiddlewareStage for DumbWaiter {
    fn name(&self) -> &str {
        "dumb-waiter"
    }

    fn enter(&self, ctx: &mut ScenarioContext) {
        ctx.settings.consistency = ConsistencyWait::FixedDelay(self.interval);
    }
}

/// Assertion adapter: prints TAP lines and folds failed assertions into the
/// scenario outcome.
pub struct TapReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TapReporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Reporter writing into a shared in-memory buffer.
    pub fn buffered() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    fn line(&self, args: fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{args}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "failed to write TAP output");
        }
    }
}

impl fmt::Debug for TapReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapReporter").finish_non_exhaustive()
    }
}

impl MiddlewareStage for TapReporter {
    fn name(&self) -> &str {
        "tap-reporter"
    }

    fn enter(&self, ctx: &mut ScenarioContext) {
        self.line(format_args!("# {}", ctx.name));
    }

    fn exit(&self, ctx: &ScenarioContext, outcome: &mut ScenarioOutcome) {
        let log = ctx.assertions.snapshot();
        let folded = outcome.is_pass() && !log.failures.is_empty();
        if folded {
            *outcome = ScenarioOutcome::Failed {
                reason: log.failures.join("; "),
            };
        }

        let number = ctx.index + 1;
        if outcome.is_pass() {
            self.line(format_args!("ok {number} {}", ctx.name));
        } else {
            self.line(format_args!("not ok {number} {}", ctx.name));
            for failure in &log.failures {
                self.line(format_args!("#   {failure}"));
            }
            if !folded {
                self.line(format_args!("#   {outcome}"));
            }
        }
    }

    fn finish(&self, stats: &RunStats) {
        self.line(format_args!("1..{}", stats.total()));
        self.line(format_args!("# pass {}", stats.passed()));
        self.line(format_args!("# fail {}", stats.failed()));
    }
}

/// Shared in-memory byte sink, cloneable so the writer and reader can both hold it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Ordered list of stages.
pub struct MiddlewarePipeline {
    stages: Vec<Box<dyn MiddlewareStage>>,
}

impl MiddlewarePipeline {
    /// Build the stack for a transport kind, reporting TAP to stdout.
    pub fn build(kind: TransportKind, consistency: ConsistencyStrategy) -> Self {
        Self::build_with_reporter(kind, consistency, TapReporter::stdout())
    }

    pub fn build_with_reporter(
        kind: TransportKind,
        consistency: ConsistencyStrategy,
        reporter: TapReporter,
    ) -> Self {
        let mut stages: Vec<Box<dyn MiddlewareStage>> = Vec::new();
        if kind == TransportKind::Memory {
            stages.push(Box::new(SingleConductor));
        }
        if let ConsistencyStrategy::FixedDelay { interval } = consistency {
            stages.push(Box::new(DumbWaiter::new(interval)));
        }
        let call_sync = match kind {
            TransportKind::Memory | TransportKind::Sim2h => CallSync::middleware(),
            TransportKind::Websocket | TransportKind::Sim1h => CallSync::direct(),
        };
        stages.push(Box::new(call_sync));
        stages.push(Box::new(reporter));

        let pipeline = Self { stages };
        tracing::debug!(transport = %kind, stages = ?pipeline.names(), "middleware pipeline built");
        pipeline
    }

    /// Append a stage. It becomes the innermost one.
    pub fn with_stage(mut self, stage: impl MiddlewareStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn enter(&self, ctx: &mut ScenarioContext) {
        for stage in &self.stages {
            stage.enter(ctx);
        }
    }

    pub fn exit(&self, ctx: &ScenarioContext, outcome: &mut ScenarioOutcome) {
        for stage in self.stages.iter().rev() {
            stage.exit(ctx, outcome);
        }
    }

    pub fn finish(&self, stats: &RunStats) {
        for stage in &self.stages {
            stage.finish(stats);
        }
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("stages", &self.names())
            .finish()
    }
}
