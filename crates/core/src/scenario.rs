//! Scenario registry and run results.
//!
//! Scenarios are registered by name before the run starts. Names are unique;
//! registration order is execution order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::conductor::BoxFuture;
use crate::error::{HarnessError, RegistryError};
use crate::orchestrator::ExecutionContext;
use crate::session::{Assertions, Session};

/// A scenario body: receives the session and assertion handle of one run.
pub type ScenarioFn =
    Arc<dyn Fn(Session, Assertions) -> BoxFuture<'static, Result<(), HarnessError>> + Send + Sync>;

/// Wrap an async closure as a [`ScenarioFn`].
///
/// ```
/// use harness_core::scenario::scenario_fn;
///
/// let body = scenario_fn(|_session, t| async move {
///     t.ok(true, "always");
///     Ok(())
/// });
/// # drop(body);
/// ```
pub fn scenario_fn<F, Fut>(f: F) -> ScenarioFn
where
    F: Fn(Session, Assertions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
{
    Arc::new(move |session, t| Box::pin(f(session, t)))
}

/// A named scenario.
#[derive(Clone)]
pub struct ScenarioEntry {
    pub name: String,
    pub body: ScenarioFn,
}

impl fmt::Debug for ScenarioEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Anything scenarios can be registered with.
///
/// Suites register through this trait so they work against both the
/// orchestrator and a bare registry.
pub trait Registrar {
    fn register_scenario(&mut self, name: &str, body: ScenarioFn) -> Result<(), HarnessError>;
}

/// Ordered, name-unique set of scenarios.
#[derive(Debug, Default)]
pub struct ScenarioRegistry {
    entries: Vec<ScenarioEntry>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scenario.
    ///
    /// # Errors
    ///
    /// `RegistryError::DuplicateName` if the name is already taken. The
    /// registry is left unchanged.
    pub fn register(&mut self, name: impl Into<String>, body: ScenarioFn) -> Result<(), HarnessError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName { name }.into());
        }
        tracing::debug!(scenario = %name, index = self.entries.len(), "registered scenario");
        self.entries.push(ScenarioEntry { name, body });
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn into_entries(self) -> Vec<ScenarioEntry> {
        self.entries
    }

    /// Run every scenario once, in registration order.
    pub async fn run_all(self, context: &ExecutionContext) -> RunStats {
        context.run_entries(self.entries).await
    }
}

impl Registrar for ScenarioRegistry {
    fn register_scenario(&mut self, name: &str, body: ScenarioFn) -> Result<(), HarnessError> {
        self.register(name, body)
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed { reason: String },
    TimedOut { after_ms: u64 },
    Panicked { reason: String },
}

impl ScenarioOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Metric label value.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Panicked { .. } => "panicked",
        }
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            Self::Panicked { reason } => write!(f, "panicked: {reason}"),
        }
    }
}

/// Result of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub duration: Duration,
    pub assertions_passed: usize,
    pub assertions_failed: usize,
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub reports: Vec<ScenarioReport>,
}

impl RunStats {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn report(&self, name: &str) -> Option<&ScenarioReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}
