//! Transport selection.
//!
//! The transport is chosen once per run from `APP_SPEC_NETWORK_TYPE`, and can be
//! replaced wholesale by a file named in `HC_TRANSPORT_CONFIG`.
//!
//! | `APP_SPEC_NETWORK_TYPE` | result |
//! |---|---|
//! | unset, `sim1h`, unrecognized | `Sim1h { dynamo_url: "http://localhost:8000" }` |
//! | `websocket` | `Websocket` |
//! | `sim2h` | `Sim2h { sim2h_url: "wss://localhost:9000" }` |
//! | `memory` | `Memory` |

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::env::EnvSource;
use crate::error::{ConfigError, HarnessError};

/// Selects the network type.
pub const NETWORK_TYPE_ENV: &str = "APP_SPEC_NETWORK_TYPE";
/// Path to a file that replaces the derived transport config.
pub const TRANSPORT_OVERRIDE_ENV: &str = "HC_TRANSPORT_CONFIG";

/// Network type used when `APP_SPEC_NETWORK_TYPE` is unset.
pub const DEFAULT_NETWORK_TYPE: &str = "sim1h";
pub const DEFAULT_DYNAMO_URL: &str = "http://localhost:8000";
pub const DEFAULT_SIM2H_URL: &str = "wss://localhost:9000";

/// Transport configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-process simulated network
    Memory,
    /// Websocket transport; the endpoint is configured outside the harness
    Websocket,
    Sim1h { dynamo_url: String },
    Sim2h { sim2h_url: String },
}

/// Transport discriminant, used to pick the middleware stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Memory,
    Websocket,
    Sim1h,
    Sim2h,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Websocket => write!(f, "websocket"),
            Self::Sim1h => write!(f, "sim1h"),
            Self::Sim2h => write!(f, "sim2h"),
        }
    }
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Memory => TransportKind::Memory,
            Self::Websocket => TransportKind::Websocket,
            Self::Sim1h { .. } => TransportKind::Sim1h,
            Self::Sim2h { .. } => TransportKind::Sim2h,
        }
    }

    /// Resolve the transport from the environment.
    ///
    /// # Errors
    ///
    /// Fails with a config error if `HC_TRANSPORT_CONFIG` names a file that
    /// is missing or cannot be parsed.
    pub async fn resolve(env: &dyn EnvSource) -> Result<Self, HarnessError> {
        // An empty value counts as unset for both variables.
        let network_type = env
            .var(NETWORK_TYPE_ENV)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_NETWORK_TYPE.to_owned());
        let derived = Self::from_network_type(&network_type);
        debug!(network_type = %network_type, transport = %derived.kind(), "derived transport");

        match env.var(TRANSPORT_OVERRIDE_ENV).filter(|p| !p.is_empty()) {
            Some(path) => {
                let overridden = Self::load_override(&path).await?;
                info!(
                    path = %path,
                    transport = %overridden.kind(),
                    "transport config replaced by override file"
                );
                Ok(overridden)
            }
            None => Ok(derived),
        }
    }

    /// Map an `APP_SPEC_NETWORK_TYPE` value to a transport.
    pub fn from_network_type(network_type: &str) -> Self {
        match network_type {
            "websocket" => Self::Websocket,
            "sim2h" => Self::default_sim2h(),
            "memory" => Self::Memory,
            "sim1h" => Self::default_sim1h(),
            other => {
                warn!(
                    network_type = other,
                    "unrecognized network type, falling back to sim1h"
                );
                Self::default_sim1h()
            }
        }
    }

    pub fn default_sim1h() -> Self {
        Self::Sim1h {
            dynamo_url: DEFAULT_DYNAMO_URL.to_owned(),
        }
    }

    pub fn default_sim2h() -> Self {
        Self::Sim2h {
            sim2h_url: DEFAULT_SIM2H_URL.to_owned(),
        }
    }

    /// Read and parse an override file.
    pub async fn load_override(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Config(ConfigError::ParseFailed {
                    reason: format!("{}: {e}", path.display()),
                })
            }
        })?;
        let format = OverrideFormat::from_path(path);
        Self::parse_override(&content, format)
    }

    /// Parse override content.
    ///
    /// JSON may be an object (`{"type": "sim2h", "sim2h_url": "..."}`) or a
    /// bare transport name (`"websocket"`). TOML must be a table with a `type` key.
    pub fn parse_override(content: &str, format: OverrideFormat) -> Result<Self, HarnessError> {
        let parse_failed = |reason: String| HarnessError::Config(ConfigError::ParseFailed { reason });
        match format {
            OverrideFormat::Toml => toml::from_str(content).map_err(|e| parse_failed(e.to_string())),
            OverrideFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| parse_failed(e.to_string()))?;
                match value {
                    serde_json::Value::String(name) => Self::from_name(&name)
                        .ok_or_else(|| parse_failed(format!("unknown transport '{name}'"))),
                    other => serde_json::from_value(other).map_err(|e| parse_failed(e.to_string())),
                }
            }
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "memory" => Some(Self::Memory),
            "websocket" => Some(Self::Websocket),
            "sim1h" => Some(Self::default_sim1h()),
            "sim2h" => Some(Self::default_sim2h()),
            _ => None,
        }
    }
}

/// Override file syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideFormat {
    Json,
    Toml,
}

impl OverrideFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}
