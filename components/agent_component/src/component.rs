//! Main heapwatch agent implementation

use crate::{AgentConfig, HeapwatchError, Result};
use memory_profiler::{
    MemoryDomain, MemoryProfiler, ReclaimRegistry, SampleSource, LEAK_WINDOW,
};
use protocol_handler::ProtocolHandler;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One-shot commands of the standalone tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Take one sample
    Stats,
    /// Rank the largest allocation sites
    Objects,
    /// Sample over a window, then run the leak heuristic
    Leaks,
    /// Force a reclamation pass
    Gc,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Stats => "stats",
            Command::Objects => "objects",
            Command::Leaks => "leaks",
            Command::Gc => "gc",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = HeapwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stats" => Ok(Command::Stats),
            "objects" => Ok(Command::Objects),
            "leaks" => Ok(Command::Leaks),
            "gc" => Ok(Command::Gc),
            other => Err(HeapwatchError::UnknownCommand(other.to_string())),
        }
    }
}

/// In-process memory profiling agent
///
/// This component is responsible for:
/// - Owning the profiler and its sample history
/// - Registering the `Memory` domain with the protocol router
/// - Running the background polling loop while started
/// - Executing the standalone commands
///
/// # Example
///
/// ```no_run
/// use agent_component::{AgentConfig, Command, HeapwatchAgent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let agent = HeapwatchAgent::new(AgentConfig::default())?;
///     agent.start().await?;
///
///     let stats = agent.run_command(Command::Stats).await?;
///     println!("{}", stats);
///
///     agent.stop().await?;
///     Ok(())
/// }
/// ```
pub struct HeapwatchAgent {
    /// Configuration for this agent
    config: AgentConfig,

    profiler: Arc<MemoryProfiler>,

    /// Protocol handler that routes messages to the Memory domain
    protocol_handler: Arc<ProtocolHandler>,

    /// Reclaim registry backing forced collection, absent for custom sources
    registry: Option<Arc<ReclaimRegistry>>,

    /// Polling task handle (when running)
    sampler_handle: Arc<RwLock<Option<JoinHandle<()>>>>,

    /// Whether the polling loop is currently running
    running: Arc<AtomicBool>,
}

impl HeapwatchAgent {
    /// Create an agent over the current process
    ///
    /// Uses `sysinfo` accounting, the process-wide allocation tracer and a
    /// reclaim registry sized by the configuration.
    pub fn new(config: AgentConfig) -> Result<Self> {
        debug!("Creating HeapwatchAgent with config: {:?}", config);

        let registry = Arc::new(ReclaimRegistry::for_process(config.reclaim_generations()));
        let source = SampleSource::system_with_reclaimer(registry.clone());

        let mut agent = Self::with_source(config, source)?;
        agent.registry = Some(registry);
        Ok(agent)
    }

    /// Create an agent over caller-supplied host facilities
    pub fn with_source(config: AgentConfig, source: SampleSource) -> Result<Self> {
        let profiler = Arc::new(MemoryProfiler::new(config.profiler_config()?, source));

        let protocol_handler = Arc::new(ProtocolHandler::new());
        protocol_handler.register_domain(Arc::new(MemoryDomain::new(profiler.clone())));
        info!("Registered Memory domain handler");

        Ok(Self {
            config,
            profiler,
            protocol_handler,
            registry: None,
            sampler_handle: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the profiler and the background polling loop
    ///
    /// Calling it while already running is a no-op. Must be called from
    /// within a tokio runtime.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Heapwatch agent already running");
            return Ok(());
        }

        let period = self.config.sample_interval();
        info!("Starting heapwatch agent, sampling every {:?}", period);

        self.profiler.start();

        let profiler = self.profiler.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poll_once(&profiler);
            }
        });

        *self.sampler_handle.write().await = Some(handle);

        info!("Heapwatch agent started");
        Ok(())
    }

    /// Stop the polling loop and the profiler
    ///
    /// Calling it while stopped is a no-op. History is kept.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Heapwatch agent already stopped");
            return Ok(());
        }

        info!("Stopping heapwatch agent");

        if let Some(handle) = self.sampler_handle.write().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.profiler.stop();

        info!("Heapwatch agent stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Route a raw JSON request through the protocol handler
    pub async fn handle_message(&self, message: &str) -> String {
        self.protocol_handler.handle_message(message).await
    }

    /// Execute a standalone command and return its JSON result
    ///
    /// Failures reported by the profiler (a failed sample, snapshot or
    /// reclamation pass) are part of the returned value, not an `Err`.
    pub async fn run_command(&self, command: Command) -> Result<Value> {
        debug!("Running command: {}", command);

        match command {
            Command::Stats => to_json(&self.profiler.collect_stats()),
            Command::Objects => match self
                .profiler
                .top_consumers(self.config.top_consumers_limit())
            {
                Ok(entries) => to_json(&entries),
                Err(info) => to_json(&[info]),
            },
            Command::Leaks => {
                for taken in 1..=LEAK_WINDOW {
                    self.profiler.collect_stats();
                    if taken < LEAK_WINDOW {
                        time::sleep(self.config.sample_interval()).await;
                    }
                }
                to_json(&self.profiler.detect_leak())
            }
            Command::Gc => match self.profiler.force_collection() {
                Ok(result) => to_json(&result),
                Err(info) => to_json(&info),
            },
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn profiler(&self) -> &Arc<MemoryProfiler> {
        &self.profiler
    }

    pub fn protocol_handler(&self) -> &Arc<ProtocolHandler> {
        &self.protocol_handler
    }

    /// Registry to which host caches can add reclaimable hooks
    pub fn reclaim_registry(&self) -> Option<&Arc<ReclaimRegistry>> {
        self.registry.as_ref()
    }

    /// Get list of registered domain names
    pub fn registered_domains(&self) -> Vec<String> {
        self.protocol_handler.domain_names()
    }
}

impl Drop for HeapwatchAgent {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sampler_handle.try_write() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// One tick of the polling loop
fn poll_once(profiler: &MemoryProfiler) {
    profiler.collect_stats();

    if let Some(report) = profiler.detect_leak().report() {
        if report.is_leak_detected {
            warn!(
                "Potential memory leak: RSS growing at {:.2} MB/s ({:.2} MB over {:.1} s, confidence {:.0}%)",
                report.growth_rate_mb_per_sec,
                report.total_growth_mb,
                report.duration_seconds,
                report.confidence_percent
            );
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
