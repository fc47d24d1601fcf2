//! Logging initialization for harness-runner.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `HarnessConfig`. The `exclude` rules of the `[logger]` section are compiled
//! into a `RegexSet` and drop every event whose target matches.

use anyhow::Result;
use regex::RegexSet;
use tracing::Metadata;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{FilterFn, filter_fn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use harness_core::config::{ConductorLoggerConfig, GeneralConfig};

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` wins over `general.log_level` when set.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable output (default)
pub fn init_tracing(general: &GeneralConfig, logger: &ConductorLoggerConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let exclude = exclude_filter(exclude_set(&logger.exclude_patterns())?);

    let registry = tracing_subscriber::registry().with(env_filter).with(exclude);
    match general.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e))?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e))?,
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    }

    Ok(())
}

/// Compile exclude patterns into one set.
pub fn exclude_set(patterns: &[&str]) -> Result<RegexSet> {
    RegexSet::new(patterns).map_err(|e| anyhow::anyhow!("invalid logger exclude pattern: {}", e))
}

/// Filter dropping events whose target matches the set.
pub fn exclude_filter(set: RegexSet) -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    filter_fn(move |meta| !set.is_match(meta.target()))
}

/// Log panics through tracing instead of the default stderr hook.
///
/// Unwinding is unaffected: a panicking scenario task still surfaces as a
/// `JoinError` to the orchestrator, and a panic in a detached task is no
/// longer silent.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_owned());
        tracing::error!(panic = %info, location = %location, "unhandled panic");
    }));
}
