//! Error types -- one enum per domain, folded into [`HarnessError`].

/// Top-level harness error.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration or transport resolution failure
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Scenario registration failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Failure raised by or around a scenario body
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// Conductor call or lifecycle failure
    #[error("conductor error: {0}")]
    Conductor(#[from] ConductorError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Whether this error came from loading configuration.
    ///
    /// The bootstrap treats these as fatal before any scenario is registered.
    pub fn is_config_load(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config or transport override file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Content could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scenario registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A scenario with the same name is already registered
    #[error("scenario already registered: {name}")]
    DuplicateName { name: String },

    /// Fewer scenarios registered than the run requires
    #[error("Expected at least {expected} scenarios, but only {registered} were registered!")]
    InsufficientScenarios { registered: usize, expected: usize },
}

/// Scenario execution errors
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The scenario body reported a failure
    #[error("{0}")]
    Failed(String),

    /// The scenario exceeded the hard timeout and was cancelled
    #[error("scenario '{name}' exceeded hard timeout of {after_ms}ms")]
    Timeout { name: String, after_ms: u64 },

    /// The scenario task panicked
    #[error("scenario '{name}' panicked: {reason}")]
    Panicked { name: String, reason: String },
}

/// Conductor errors
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// The agent is not hosted by this conductor
    #[error("unknown agent '{agent}' on conductor '{conductor}'")]
    UnknownAgent { conductor: String, agent: String },

    /// The zome call returned an error
    #[error("call {zome}/{func} failed: {reason}")]
    CallFailed {
        zome: String,
        func: String,
        reason: String,
    },

    /// The conductor has shut down or its worker is gone
    #[error("conductor '{0}' is closed")]
    Closed(String),
}
