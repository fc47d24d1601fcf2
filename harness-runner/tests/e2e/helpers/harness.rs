//! Test bootstrap builder.
//!
//! Provides [`TestHarness`] for building a `Bootstrap` with an injected
//! environment, custom suites and captured output.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use harness_core::conductor::MemoryBackend;
use harness_core::config::HarnessConfig;
use harness_core::middleware::{SharedBuffer, TapReporter};
use harness_runner::bootstrap::{Bootstrap, BootstrapExit};
use harness_runner::suites::Suite;

/// Output captured from one run.
#[allow(dead_code)]
pub struct RunOutput {
    pub exit: BootstrapExit,
    pub console: String,
    pub diagnostics: String,
    pub tap: String,
}

/// Builder for a bootstrap under test.
///
/// Defaults: empty environment, default config, no suites, memory backend
/// without publish delay.
pub struct TestHarness {
    env: HashMap<String, String>,
    config: HarnessConfig,
    suites: Vec<Suite>,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Self {
        Self {
            env: HashMap::new(),
            config: HarnessConfig::default(),
            suites: Vec::new(),
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn suite(mut self, suite: Suite) -> Self {
        self.suites.push(suite);
        self
    }

    /// Shrink the waiter so timeout tests finish quickly.
    pub fn timeouts(mut self, soft: Duration, hard: Duration) -> Self {
        self.config.waiter.soft_timeout_ms = soft.as_millis() as u64;
        self.config.waiter.hard_timeout_ms = hard.as_millis() as u64;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut HarnessConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn run(self) -> RunOutput {
        let (reporter, tap) = TapReporter::buffered();
        let console = SharedBuffer::default();
        let diagnostics = SharedBuffer::default();

        let exit = Bootstrap::new(self.config, Arc::new(self.env))
            .with_suites(self.suites)
            .with_backend(Arc::new(
                MemoryBackend::new().with_publish_delay(Duration::ZERO),
            ))
            .with_reporter(reporter)
            .with_output(console.clone(), diagnostics.clone())
            .run()
            .await;

        RunOutput {
            exit,
            console: console.contents(),
            diagnostics: diagnostics.contents(),
            tap: tap.contents(),
        }
    }
}
