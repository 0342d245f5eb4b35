//! Heapwatch agent orchestration
//!
//! This module provides the HeapwatchAgent that ties the memory profiler,
//! the protocol router and the background polling loop together, and runs
//! the standalone `stats`, `objects`, `leaks` and `gc` commands.
//!
//! # Example
//!
//! ```no_run
//! use agent_component::{AgentConfig, Command, HeapwatchAgent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::builder().max_samples(50).build()?;
//!
//!     let agent = HeapwatchAgent::new(config)?;
//!     let leaks = agent.run_command(Command::Leaks).await?;
//!     println!("{}", leaks);
//!     Ok(())
//! }
//! ```

mod component;
mod config;
mod error;

pub use component::{Command, HeapwatchAgent};
pub use config::{
    AgentConfig, AgentConfigBuilder, ENV_MAX_SAMPLES, ENV_SAMPLE_INTERVAL_MS, ENV_TOP_LIMIT,
};
pub use error::{HeapwatchError, Result};
