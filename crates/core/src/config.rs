//! Harness configuration -- `harness.toml` parsing and runtime settings.
//!
//! [`HarnessConfig`] holds everything except the transport, which is resolved
//! separately from `APP_SPEC_NETWORK_TYPE` / `HC_TRANSPORT_CONFIG`
//! (see [`crate::transport`]).
//!
//! # Loading precedence
//! 1. CLI flags (highest)
//! 2. Environment (`HARNESS_WAITER_SOFT_TIMEOUT_MS=2000` style)
//! 3. Config file (`harness.toml`)
//! 4. Defaults (`Default` impls)
//!
//! ```no_run
//! # async fn example() -> Result<(), harness_core::error::HarnessError> {
//! use harness_core::config::HarnessConfig;
//! use harness_core::env::ProcessEnv;
//!
//! let config = HarnessConfig::load("harness.toml", &ProcessEnv).await?;
//! let config = HarnessConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::env::EnvSource;
use crate::error::{ConfigError, HarnessError};

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Logging of the harness process itself
    #[serde(default)]
    pub general: GeneralConfig,
    /// Per-scenario timeouts
    #[serde(default)]
    pub waiter: WaiterConfig,
    /// Logger settings handed to conductors
    #[serde(default)]
    pub logger: ConductorLoggerConfig,
    /// Run behavior
    #[serde(default)]
    pub run: RunConfig,
}

impl HarnessConfig {
    /// Load from a TOML file, then apply environment overrides and validate.
    pub async fn load(path: impl AsRef<Path>, env: &dyn EnvSource) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, HarnessError> {
        let mut config = Self::default();
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Apply `HARNESS_{SECTION}_{FIELD}` overrides.
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) {
        override_string(env, &mut self.general.log_level, "HARNESS_GENERAL_LOG_LEVEL");
        override_string(env, &mut self.general.log_format, "HARNESS_GENERAL_LOG_FORMAT");

        override_u64(
            env,
            &mut self.waiter.soft_timeout_ms,
            "HARNESS_WAITER_SOFT_TIMEOUT_MS",
        );
        override_u64(
            env,
            &mut self.waiter.hard_timeout_ms,
            "HARNESS_WAITER_HARD_TIMEOUT_MS",
        );

        override_bool(env, &mut self.logger.state_dump, "HARNESS_LOGGER_STATE_DUMP");

        if let Some(val) = env.var("HARNESS_RUN_CONSISTENCY") {
            match val.parse::<ConsistencyMode>() {
                Ok(mode) => self.run.consistency = mode,
                Err(_) => warn!(
                    env_key = "HARNESS_RUN_CONSISTENCY",
                    value = val.as_str(),
                    "unknown consistency mode, ignoring"
                ),
            }
        }
        override_u64(env, &mut self.run.fixed_delay_ms, "HARNESS_RUN_FIXED_DELAY_MS");
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.waiter.soft_timeout_ms == 0 {
            return Err(invalid("waiter.soft_timeout_ms", "must be greater than 0"));
        }
        if self.waiter.hard_timeout_ms < self.waiter.soft_timeout_ms {
            return Err(invalid(
                "waiter.hard_timeout_ms",
                format!(
                    "must be >= soft_timeout_ms ({})",
                    self.waiter.soft_timeout_ms
                ),
            ));
        }

        for (idx, rule) in self.logger.rules.iter().enumerate() {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                return Err(invalid(
                    &format!("logger.rules[{idx}].pattern"),
                    e.to_string(),
                ));
            }
        }

        if self.run.consistency == ConsistencyMode::FixedDelay && self.run.fixed_delay_ms == 0 {
            return Err(invalid(
                "run.fixed_delay_ms",
                "must be greater than 0 when consistency = \"fixed-delay\"",
            ));
        }

        Ok(())
    }

    /// Consistency strategy selected by `[run]`.
    pub fn consistency_strategy(&self) -> ConsistencyStrategy {
        match self.run.consistency {
            ConsistencyMode::CallSync => ConsistencyStrategy::CallSync,
            ConsistencyMode::FixedDelay => ConsistencyStrategy::FixedDelay {
                interval: Duration::from_millis(self.run.fixed_delay_ms),
            },
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> HarnessError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// Logging of the harness process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Scenario timeouts.
///
/// Passing the soft timeout only logs a warning; passing the hard timeout
/// cancels the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    pub soft_timeout_ms: u64,
    pub hard_timeout_ms: u64,
}

impl WaiterConfig {
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            soft_timeout_ms: 5_000,
            hard_timeout_ms: 10_000,
        }
    }
}

/// Logger configuration passed through to conductors.
///
/// `exclude` rules are also applied to the harness's own log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorLoggerConfig {
    pub log_type: String,
    pub rules: Vec<LogRule>,
    /// Dump conductor state after every call
    pub state_dump: bool,
}

impl ConductorLoggerConfig {
    /// Patterns of all `exclude = true` rules.
    pub fn exclude_patterns(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.exclude)
            .map(|r| r.pattern.as_str())
            .collect()
    }
}

impl Default for ConductorLoggerConfig {
    fn default() -> Self {
        let noisy = [
            ".*parity.*",
            ".*mio.*",
            ".*tokio*",
            ".*hyper.*",
            ".*rusoto_core.*",
            ".*want.*",
            ".*holochain_core_types*",
            ".*holochain_net*",
            ".*rpc.*",
        ];
        Self {
            log_type: "debug".to_owned(),
            rules: noisy
                .iter()
                .map(|p| LogRule {
                    exclude: true,
                    pattern: (*p).to_owned(),
                })
                .collect(),
            state_dump: false,
        }
    }
}

/// A single logger filter rule (regex over the log target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRule {
    #[serde(default)]
    pub exclude: bool,
    pub pattern: String,
}

/// Run behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub consistency: ConsistencyMode,
    /// Delay used by `fixed-delay` consistency
    pub fixed_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyMode::CallSync,
            fixed_delay_ms: 1_000,
        }
    }
}

/// How `Session::consistency()` waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyMode {
    CallSync,
    FixedDelay,
}

impl std::str::FromStr for ConsistencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call-sync" => Ok(Self::CallSync),
            "fixed-delay" => Ok(Self::FixedDelay),
            other => Err(format!("unknown consistency mode '{other}'")),
        }
    }
}

/// Resolved consistency strategy, consumed by the middleware builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyStrategy {
    /// Calls are synchronous; waiting settles the conductors.
    CallSync,
    /// Waiting sleeps for a fixed interval.
    FixedDelay { interval: Duration },
}

// --- env override helpers ---

fn override_string(env: &dyn EnvSource, target: &mut String, env_key: &str) {
    if let Some(val) = env.var(env_key) {
        *target = val;
    }
}

fn override_bool(env: &dyn EnvSource, target: &mut bool, env_key: &str) {
    if let Some(val) = env.var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(env: &dyn EnvSource, target: &mut u64, env_key: &str) {
    if let Some(val) = env.var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
