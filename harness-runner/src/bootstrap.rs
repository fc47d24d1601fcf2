//! Run bootstrap -- transport resolution, suite registration, run.
//!
//! # Steps
//!
//! 1. Resolve the transport; a config load failure ends the run (exit 1)
//!    before anything is registered
//! 2. Build the middleware stack for the resolved transport kind
//! 3. Register every suite, in order; a registration error is fatal
//! 4. Refuse to run with fewer than [`MIN_EXPECTED_SCENARIOS`] scenarios
//! 5. Run everything once; individual failures do not change the exit code

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::{debug, error, info};

use harness_core::conductor::{ConductorBackend, MemoryBackend};
use harness_core::config::HarnessConfig;
use harness_core::env::EnvSource;
use harness_core::error::{HarnessError, RegistryError};
use harness_core::middleware::TapReporter;
use harness_core::orchestrator::{ExecutionContext, Orchestrator};
use harness_core::scenario::RunStats;
use harness_core::transport::TransportConfig;

use crate::suites::{Suite, default_suites};

/// Fewest scenarios a run may register.
pub const MIN_EXPECTED_SCENARIOS: usize = 1;

/// How a bootstrap ended.
#[derive(Debug)]
pub enum BootstrapExit {
    /// Scenarios ran; individual failures are in the stats.
    Completed(RunStats),
    /// Transport configuration could not be loaded.
    ConfigLoad(HarnessError),
    /// A suite failed to register its scenarios.
    Registration {
        suite: &'static str,
        error: HarnessError,
    },
    /// Fewer scenarios than [`MIN_EXPECTED_SCENARIOS`] were registered.
    InsufficientScenarios { registered: usize, expected: usize },
}

impl BootstrapExit {
    /// Process exit code: 0 when the run completed, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed(_) => 0,
            Self::ConfigLoad(_) | Self::Registration { .. } | Self::InsufficientScenarios { .. } => 1,
        }
    }

    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            Self::Completed(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Wires configuration, suites and a conductor backend into one run.
pub struct Bootstrap {
    config: HarnessConfig,
    env: Arc<dyn EnvSource>,
    suites: Vec<Suite>,
    backend: Arc<dyn ConductorBackend>,
    reporter: Option<TapReporter>,
    console: Box<dyn Write + Send>,
    diagnostics: Box<dyn Write + Send>,
}

impl Bootstrap {
    /// Bootstrap with the built-in suites and the in-process backend.
    pub fn new(config: HarnessConfig, env: Arc<dyn EnvSource>) -> Self {
        Self {
            config,
            env,
            suites: default_suites(),
            backend: Arc::new(MemoryBackend::new()),
            reporter: None,
            console: Box::new(io::stdout()),
            diagnostics: Box::new(io::stderr()),
        }
    }

    pub fn with_suites(mut self, suites: Vec<Suite>) -> Self {
        self.suites = suites;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ConductorBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Where TAP output goes (stdout by default).
    pub fn with_reporter(mut self, reporter: TapReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Where progress lines and diagnostics go (stdout / stderr by default).
    pub fn with_output(
        mut self,
        console: impl Write + Send + 'static,
        diagnostics: impl Write + Send + 'static,
    ) -> Self {
        self.console = Box::new(console);
        self.diagnostics = Box::new(diagnostics);
        self
    }

    /// Register every suite and return the scenario names, without running.
    pub async fn list(mut self) -> Result<Vec<String>, BootstrapExit> {
        let orchestrator = self.prepare().await?;
        Ok(orchestrator
            .registry()
            .names()
            .into_iter()
            .map(str::to_owned)
            .collect())
    }

    /// Resolve, register and run.
    pub async fn run(mut self) -> BootstrapExit {
        let orchestrator = match self.prepare().await {
            Ok(orchestrator) => orchestrator,
            Err(exit) => return exit,
        };

        let registered = orchestrator.num_registered();
        if registered < MIN_EXPECTED_SCENARIOS {
            let err = RegistryError::InsufficientScenarios {
                registered,
                expected: MIN_EXPECTED_SCENARIOS,
            };
            error!(registered, expected = MIN_EXPECTED_SCENARIOS, "not enough scenarios");
            emit(&mut self.diagnostics, format_args!("{err}"));
            return BootstrapExit::InsufficientScenarios {
                registered,
                expected: MIN_EXPECTED_SCENARIOS,
            };
        }

        emit(
            &mut self.console,
            format_args!(
                "Registered {registered} scenarios (at least {MIN_EXPECTED_SCENARIOS} were expected)"
            ),
        );
        let stats = orchestrator.run().await;
        emit(&mut self.console, format_args!("All done."));
        info!(
            total = stats.total(),
            passed = stats.passed(),
            failed = stats.failed(),
            "run complete"
        );
        BootstrapExit::Completed(stats)
    }

    async fn prepare(&mut self) -> Result<Orchestrator, BootstrapExit> {
        let transport = match TransportConfig::resolve(self.env.as_ref()).await {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "failed to resolve transport config");
                emit(&mut self.diagnostics, format_args!("failed to load transport config: {e}"));
                return Err(BootstrapExit::ConfigLoad(e));
            }
        };
        info!(transport = %transport.kind(), "transport resolved");

        let reporter = self.reporter.take().unwrap_or_else(TapReporter::stdout);
        let context = ExecutionContext::from_config(
            transport,
            &self.config,
            Arc::clone(&self.backend),
            reporter,
        );
        let mut orchestrator = Orchestrator::new(context);

        for suite in &self.suites {
            let before = orchestrator.num_registered();
            if let Err(e) = (suite.register)(&mut orchestrator) {
                error!(suite = suite.name, error = %e, "suite registration failed");
                emit(
                    &mut self.diagnostics,
                    format_args!("failed to register suite '{}': {e}", suite.name),
                );
                return Err(BootstrapExit::Registration {
                    suite: suite.name,
                    error: e,
                });
            }
            debug!(
                suite = suite.name,
                scenarios = orchestrator.num_registered() - before,
                "suite registered"
            );
        }

        Ok(orchestrator)
    }
}

fn emit(out: &mut impl Write, args: fmt::Arguments<'_>) {
    if let Err(e) = writeln!(out, "{args}").and_then(|()| out.flush()) {
        tracing::warn!(error = %e, "failed to write run output");
    }
}
