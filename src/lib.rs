//! heapwatch command-line front end
//!
//! Parses the command line, builds a [`HeapwatchAgent`] over the current
//! process and runs one command, producing its JSON result.

pub mod cli;

pub use cli::{Cli, CliCommand};

use agent_component::HeapwatchAgent;
use anyhow::Context;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Install the stderr log subscriber
///
/// `level` wins over `RUST_LOG`. Stdout is left for JSON output.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A subscriber installed earlier (tests) stays in place
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Build an agent over the current process and run the parsed command
pub async fn run(cli: &Cli) -> anyhow::Result<Value> {
    let config = cli.agent_config().context("invalid configuration")?;
    let agent = HeapwatchAgent::new(config).context("failed to create agent")?;
    execute(cli, &agent).await
}

/// Run the parsed command against `agent`
pub async fn execute(cli: &Cli, agent: &HeapwatchAgent) -> anyhow::Result<Value> {
    if let Some(command) = cli.command.agent_command() {
        debug!("Executing {}", command);
        return Ok(agent.run_command(command).await?);
    }

    let CliCommand::Watch { duration_secs } = cli.command else {
        anyhow::bail!("command has no handler");
    };

    info!("Watching for {} s", duration_secs);
    agent.start().await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    agent.stop().await?;

    Ok(serde_json::to_value(agent.profiler().detect_leak())?)
}
