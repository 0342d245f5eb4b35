//! Sample Source: adapters over the host's memory facilities
//!
//! The profiler never talks to the operating system or the allocator
//! directly. It goes through three traits, one per host facility, bundled
//! into a [`SampleSource`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::errors::HostError;
use crate::host::SysinfoAccounting;
use crate::reclaim::{ReclaimRegistry, DEFAULT_GENERATIONS};
use crate::tracer::GlobalTracer;
use crate::types::{
    AllocationSite, ErrorInfo, GenerationStats, ProcessMemory, Sample, SampleRecord, TracedMemory,
};

/// Process-level memory accounting (RSS, VMS, share of system memory)
pub trait MemoryAccounting: Send + Sync {
    fn process_memory(&self) -> Result<ProcessMemory, HostError>;
}

/// Allocation tracing facility
pub trait AllocationTracer: Send + Sync {
    /// Begin tracing. Calling it while already tracing is a no-op.
    fn start(&self);

    fn is_tracing(&self) -> bool;

    /// Current and peak traced bytes; zeros when not tracing
    fn traced_memory(&self) -> TracedMemory;

    /// Live allocation sites grouped by source line, largest first
    fn snapshot(&self) -> Result<Vec<AllocationSite>, HostError>;
}

/// Automatic reclamation subsystem
pub trait Reclaimer: Send + Sync {
    /// Run a full reclamation pass, returning the number of objects reclaimed
    fn force_collect(&self) -> Result<u64, HostError>;

    /// Counters per generation, in fixed generation order
    fn generation_stats(&self) -> Vec<GenerationStats>;

    fn live_object_count(&self) -> u64;
}

/// Reads instantaneous memory metrics from the host facilities
pub struct SampleSource {
    accounting: Arc<dyn MemoryAccounting>,
    tracer: Arc<dyn AllocationTracer>,
    reclaimer: Arc<dyn Reclaimer>,
    /// Last timestamp handed out, keeps timestamps non-decreasing
    last_timestamp: AtomicU64,
}

impl SampleSource {
    /// Bundle host facilities. Starts the tracer if it is not already running.
    pub fn new(
        accounting: Arc<dyn MemoryAccounting>,
        tracer: Arc<dyn AllocationTracer>,
        reclaimer: Arc<dyn Reclaimer>,
    ) -> Self {
        tracer.start();
        Self {
            accounting,
            tracer,
            reclaimer,
            last_timestamp: AtomicU64::new(0),
        }
    }

    /// Facilities of the current process: `sysinfo` accounting, the
    /// process-wide allocation tracer and a default-sized reclaim registry
    pub fn system() -> Self {
        Self::system_with_reclaimer(Arc::new(ReclaimRegistry::for_process(
            DEFAULT_GENERATIONS,
        )))
    }

    /// Like [`SampleSource::system`] with a host-provided reclaimer
    pub fn system_with_reclaimer(reclaimer: Arc<dyn Reclaimer>) -> Self {
        Self::new(
            Arc::new(SysinfoAccounting::new()),
            Arc::new(GlobalTracer),
            reclaimer,
        )
    }

    /// Milliseconds since epoch, never lower than a previously returned value
    pub fn now_millis(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let previous = self.last_timestamp.fetch_max(wall, Ordering::SeqCst);
        wall.max(previous)
    }

    /// Take one sample. Host failures become an error record, never a panic
    /// or an `Err`.
    pub fn collect(&self) -> SampleRecord {
        let timestamp = self.now_millis();

        let memory = match self.accounting.process_memory() {
            Ok(memory) => memory,
            Err(e) => {
                warn!("Sample collection failed: {}", e);
                return ErrorInfo::new(e.to_string(), timestamp).into();
            }
        };

        let traced = self.tracer.traced_memory();
        let generations = self.reclaimer.generation_stats();

        debug!(
            "Collected sample: rss={} vms={} traced={}",
            memory.rss, memory.vms, traced.current
        );

        Sample {
            timestamp,
            rss: memory.rss,
            vms: memory.vms,
            percent: memory.percent.clamp(0.0, 100.0),
            traced_current: traced.current,
            traced_peak: traced.peak,
            gc_collections: generations.iter().map(|g| g.collections).collect(),
            gc_collected: generations.iter().map(|g| g.collected).collect(),
            gc_uncollectable: generations.iter().map(|g| g.uncollectable).collect(),
            object_count: self.reclaimer.live_object_count(),
        }
        .into()
    }

    /// Allocation-site snapshot straight from the tracer
    pub fn snapshot(&self) -> Result<Vec<AllocationSite>, HostError> {
        self.tracer.snapshot()
    }

    /// Forced reclamation pass straight through to the reclaimer
    pub fn force_collect(&self) -> Result<u64, HostError> {
        self.reclaimer.force_collect()
    }

    pub fn is_tracing(&self) -> bool {
        self.tracer.is_tracing()
    }
}

impl fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSource")
            .field("tracing", &self.tracer.is_tracing())
            .field("last_timestamp", &self.last_timestamp.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
