use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use harness_core::config::HarnessConfig;
use harness_core::env::ProcessEnv;
use harness_core::transport::TransportConfig;
use harness_runner::bootstrap::Bootstrap;
use harness_runner::cli::RunnerCli;
use harness_runner::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = RunnerCli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: RunnerCli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path, &ProcessEnv).await?,
        None => HarnessConfig::from_env(&ProcessEnv)?,
    };

    // CLI flags win over file and environment.
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config.validate()?;

    logging::init_tracing(&config.general, &config.logger)?;
    logging::install_panic_hook();
    harness_core::metrics::describe_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "harness-runner starting"
    );

    if cli.validate {
        let transport = TransportConfig::resolve(&ProcessEnv).await?;
        println!("{}", toml::to_string_pretty(&config)?);
        println!("# transport");
        println!("{}", serde_json::to_string_pretty(&transport)?);
        return Ok(ExitCode::SUCCESS);
    }

    let bootstrap = Bootstrap::new(config, Arc::new(ProcessEnv));

    if cli.list {
        return Ok(match bootstrap.list().await {
            Ok(names) => {
                for name in names {
                    println!("{name}");
                }
                ExitCode::SUCCESS
            }
            Err(exit) => ExitCode::from(exit.exit_code()),
        });
    }

    let exit = bootstrap.run().await;
    tracing::info!(exit_code = exit.exit_code(), "harness-runner finished");
    Ok(ExitCode::from(exit.exit_code()))
}
