#![doc = include_str!("../README.md")]

pub mod conductor;
pub mod config;
pub mod env;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod scenario;
pub mod session;
pub mod transport;

// --- re-exports ---

// errors
pub use error::{ConductorError, ConfigError, HarnessError, RegistryError, ScenarioError};

// config
pub use config::{ConsistencyStrategy, HarnessConfig};
pub use env::{EnvSource, ProcessEnv};
pub use transport::{TransportConfig, TransportKind};

// execution
pub use conductor::{Conductor, ConductorBackend, MemoryBackend};
pub use middleware::{MiddlewarePipeline, MiddlewareStage, TapReporter};
pub use orchestrator::{ExecutionContext, Orchestrator};
pub use scenario::{Registrar, RunStats, ScenarioOutcome, ScenarioRegistry, scenario_fn};
pub use session::{Assertions, Player, Session};
