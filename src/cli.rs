//! CLI command definitions using clap.

use agent_component::{AgentConfig, Command};
use clap::{Parser, Subcommand};
use std::time::Duration;

/// heapwatch - in-process memory profiler
#[derive(Parser, Debug)]
#[command(name = "heapwatch")]
#[command(version)]
#[command(about = "Samples memory usage, ranks allocation sites and flags sustained growth")]
pub struct Cli {
    /// Samples kept in history (overrides HEAPWATCH_MAX_SAMPLES)
    #[arg(long, global = true)]
    pub max_samples: Option<usize>,

    /// Sampling interval in milliseconds (overrides HEAPWATCH_SAMPLE_INTERVAL_MS)
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Log filter such as "debug" or "memory_profiler=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Take one memory sample
    Stats,

    /// List the largest allocation sites
    Objects {
        /// Number of sites to report (overrides HEAPWATCH_TOP_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Take five spaced samples and run leak detection
    Leaks,

    /// Force a reclamation pass and report the memory freed
    Gc,

    /// Poll in the background, then report the leak assessment
    Watch {
        /// How long to poll before reporting
        #[arg(short, long, default_value_t = 10)]
        duration_secs: u64,
    },
}

impl CliCommand {
    /// The agent command this maps to; `watch` has none
    pub fn agent_command(&self) -> Option<Command> {
        match self {
            CliCommand::Stats => Some(Command::Stats),
            CliCommand::Objects { .. } => Some(Command::Objects),
            CliCommand::Leaks => Some(Command::Leaks),
            CliCommand::Gc => Some(Command::Gc),
            CliCommand::Watch { .. } => None,
        }
    }
}

impl Cli {
    /// Agent configuration from the environment, then command-line flags
    pub fn agent_config(&self) -> agent_component::Result<AgentConfig> {
        self.agent_config_with(|key| std::env::var(key).ok())
    }

    /// Like [`Cli::agent_config`] with an explicit variable lookup
    pub fn agent_config_with<F>(&self, lookup: F) -> agent_component::Result<AgentConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = AgentConfig::builder().overrides_from(lookup)?;

        if let Some(max_samples) = self.max_samples {
            builder = builder.max_samples(max_samples);
        }
        if let Some(interval_ms) = self.interval_ms {
            builder = builder.sample_interval(Duration::from_millis(interval_ms));
        }
        if let CliCommand::Objects {
            limit: Some(limit),
        } = &self.command
        {
            builder = builder.top_consumers_limit(*limit);
        }

        builder.build()
    }
}
