//! CLI argument definitions for harness-runner.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Scenario test harness.
///
/// Resolves the transport from `APP_SPEC_NETWORK_TYPE` / `HC_TRANSPORT_CONFIG`,
/// registers the built-in suites and runs every scenario once.
#[derive(Parser, Debug)]
#[command(name = "harness-runner")]
#[command(version, about, long_about = None)]
pub struct RunnerCli {
    /// Path to a harness.toml configuration file.
    ///
    /// Without it, defaults plus `HARNESS_*` environment overrides are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Register scenarios, print their names and exit without running them.
    #[arg(long, conflicts_with = "validate")]
    pub list: bool,

    /// Resolve configuration and transport, print them and exit.
    #[arg(long)]
    pub validate: bool,
}
