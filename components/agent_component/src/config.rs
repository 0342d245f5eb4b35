//! Configuration for the heapwatch agent

use memory_profiler::{ProfilerConfig, DEFAULT_GENERATIONS, DEFAULT_MAX_SAMPLES, DEFAULT_TOP_LIMIT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{HeapwatchError, Result};

/// Environment variable overriding `max_samples`
pub const ENV_MAX_SAMPLES: &str = "HEAPWATCH_MAX_SAMPLES";
/// Environment variable overriding `sample_interval`, in milliseconds
pub const ENV_SAMPLE_INTERVAL_MS: &str = "HEAPWATCH_SAMPLE_INTERVAL_MS";
/// Environment variable overriding `top_consumers_limit`
pub const ENV_TOP_LIMIT: &str = "HEAPWATCH_TOP_LIMIT";

/// Configuration for the heapwatch agent
///
/// Holds the history capacity, the polling period and the defaults used by
/// the standalone commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Samples kept in history
    max_samples: usize,

    /// Period of the background polling loop, also the spacing of the
    /// samples taken by the `leaks` command
    sample_interval: Duration,

    /// Entries reported by the `objects` command
    top_consumers_limit: usize,

    /// Generations in the reclaim registry
    reclaim_generations: usize,
}

impl AgentConfig {
    /// Create a new builder for AgentConfig
    ///
    /// # Example
    ///
    /// ```
    /// use agent_component::AgentConfig;
    /// use std::time::Duration;
    ///
    /// let config = AgentConfig::builder()
    ///     .max_samples(50)
    ///     .sample_interval(Duration::from_millis(500))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_samples(), 50);
    /// ```
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Defaults overlaid with `HEAPWATCH_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::builder().env_overrides()?.build()
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    pub fn top_consumers_limit(&self) -> usize {
        self.top_consumers_limit
    }

    pub fn reclaim_generations(&self) -> usize {
        self.reclaim_generations
    }

    /// Engine settings derived from this configuration
    pub fn profiler_config(&self) -> Result<ProfilerConfig> {
        Ok(ProfilerConfig::new(self.max_samples)?)
    }
}

impl Default for AgentConfig {
    /// Default values:
    /// - max_samples: 100
    /// - sample_interval: 1 s
    /// - top_consumers_limit: 10
    /// - reclaim_generations: 3
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            sample_interval: Duration::from_secs(1),
            top_consumers_limit: DEFAULT_TOP_LIMIT,
            reclaim_generations: DEFAULT_GENERATIONS,
        }
    }
}

/// Builder for AgentConfig
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    max_samples: Option<usize>,
    sample_interval: Option<Duration>,
    top_consumers_limit: Option<usize>,
    reclaim_generations: Option<usize>,
}

impl AgentConfigBuilder {
    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    pub fn top_consumers_limit(mut self, limit: usize) -> Self {
        self.top_consumers_limit = Some(limit);
        self
    }

    pub fn reclaim_generations(mut self, generations: usize) -> Self {
        self.reclaim_generations = Some(generations);
        self
    }

    /// Apply `HEAPWATCH_*` environment variables
    pub fn env_overrides(self) -> Result<Self> {
        self.overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `HEAPWATCH_*` names
    ///
    /// Values already set on the builder are replaced. A value that does not
    /// parse as an unsigned integer is a configuration error.
    pub fn overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var(&lookup, ENV_MAX_SAMPLES)? {
            self.max_samples = Some(value as usize);
        }
        if let Some(value) = parse_var(&lookup, ENV_SAMPLE_INTERVAL_MS)? {
            self.sample_interval = Some(Duration::from_millis(value));
        }
        if let Some(value) = parse_var(&lookup, ENV_TOP_LIMIT)? {
            self.top_consumers_limit = Some(value as usize);
        }
        Ok(self)
    }

    /// Build the AgentConfig
    ///
    /// Uses default values for any options not explicitly set, then rejects
    /// zero capacity, a zero interval, a zero limit and zero generations.
    pub fn build(self) -> Result<AgentConfig> {
        let default = AgentConfig::default();

        let config = AgentConfig {
            max_samples: self.max_samples.unwrap_or(default.max_samples),
            sample_interval: self.sample_interval.unwrap_or(default.sample_interval),
            top_consumers_limit: self
                .top_consumers_limit
                .unwrap_or(default.top_consumers_limit),
            reclaim_generations: self
                .reclaim_generations
                .unwrap_or(default.reclaim_generations),
        };

        if config.max_samples == 0 {
            return Err(invalid("max_samples must be a positive integer"));
        }
        if config.sample_interval.is_zero() {
            return Err(invalid("sample_interval must be greater than zero"));
        }
        if config.top_consumers_limit == 0 {
            return Err(invalid("top_consumers_limit must be at least 1"));
        }
        if config.reclaim_generations == 0 {
            return Err(invalid("reclaim_generations must be at least 1"));
        }

        Ok(config)
    }
}

fn invalid(message: &str) -> HeapwatchError {
    HeapwatchError::InvalidConfiguration(message.to_string())
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            HeapwatchError::InvalidConfiguration(format!(
                "{} must be an unsigned integer, got '{}'",
                key, raw
            ))
        }),
    }
}
