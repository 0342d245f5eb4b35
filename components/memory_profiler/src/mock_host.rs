//! Mock host facilities for testing the profiler
//!
//! Deterministic stand-ins for the three host traits: scripted RSS readings,
//! scripted snapshots and a counting reclaimer. In production these are
//! replaced by [`crate::SampleSource::system`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::HostError;
use crate::source::{AllocationTracer, MemoryAccounting, Reclaimer, SampleSource};
use crate::types::{AllocationSite, GenerationStats, ProcessMemory, TracedMemory};

/// Returns queued readings in order, repeating the last one once the queue
/// runs dry
pub struct ScriptedAccounting {
    readings: Mutex<VecDeque<Result<ProcessMemory, HostError>>>,
    last: Mutex<Option<Result<ProcessMemory, HostError>>>,
}

impl ScriptedAccounting {
    pub fn new() -> Self {
        Self {
            readings: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
        }
    }

    /// Queue readings with the given RSS values (VMS is twice RSS)
    pub fn with_rss(values: &[u64]) -> Self {
        let accounting = Self::new();
        for &rss in values {
            accounting.push_rss(rss);
        }
        accounting
    }

    pub fn push_rss(&self, rss: u64) {
        self.readings.lock().push_back(Ok(ProcessMemory {
            rss,
            vms: rss.saturating_mul(2),
            percent: 1.0,
        }));
    }

    pub fn push_failure(&self, message: &str) {
        self.readings
            .lock()
            .push_back(Err(HostError::ProcessUnavailable(message.to_string())));
    }
}

impl Default for ScriptedAccounting {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccounting for ScriptedAccounting {
    fn process_memory(&self) -> Result<ProcessMemory, HostError> {
        let next = self.readings.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(reading) = next {
            *last = Some(reading);
        }
        last.clone()
            .unwrap_or_else(|| Err(HostError::ProcessUnavailable("no readings queued".to_string())))
    }
}

/// Tracer returning a fixed snapshot, or failing when told to
#[derive(Default)]
pub struct ScriptedTracer {
    tracing: AtomicBool,
    sites: Mutex<Vec<AllocationSite>>,
    failure: Mutex<Option<HostError>>,
}

impl ScriptedTracer {
    pub fn new(sites: Vec<AllocationSite>) -> Self {
        Self {
            tracing: AtomicBool::new(false),
            sites: Mutex::new(sites),
            failure: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, error: HostError) {
        *self.failure.lock() = Some(error);
    }

    pub fn stop(&self) {
        self.tracing.store(false, Ordering::SeqCst);
    }
}

impl AllocationTracer for ScriptedTracer {
    fn start(&self) {
        self.tracing.store(true, Ordering::SeqCst);
    }

    fn is_tracing(&self) -> bool {
        self.tracing.load(Ordering::SeqCst)
    }

    fn traced_memory(&self) -> TracedMemory {
        if !self.is_tracing() {
            return TracedMemory::default();
        }
        let current = self.sites.lock().iter().map(|s| s.size_bytes).sum();
        TracedMemory {
            current,
            peak: current,
        }
    }

    fn snapshot(&self) -> Result<Vec<AllocationSite>, HostError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        if !self.is_tracing() {
            return Err(HostError::TracerNotStarted);
        }
        Ok(self.sites.lock().clone())
    }
}

/// Reclaimer reporting a fixed object count per pass
pub struct CountingReclaimer {
    per_pass: u64,
    passes: AtomicU64,
    fail: AtomicBool,
}

impl CountingReclaimer {
    pub fn new(per_pass: u64) -> Self {
        Self {
            per_pass,
            passes: AtomicU64::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Reclaimer for CountingReclaimer {
    fn force_collect(&self) -> Result<u64, HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::ReclaimFailed("collector offline".to_string()));
        }
        self.passes.fetch_add(1, Ordering::SeqCst);
        Ok(self.per_pass)
    }

    fn generation_stats(&self) -> Vec<GenerationStats> {
        let passes = self.passes();
        vec![GenerationStats {
            collections: passes,
            collected: passes * self.per_pass,
            uncollectable: 0,
        }]
    }

    fn live_object_count(&self) -> u64 {
        42
    }
}

/// Build an allocation site with a single-line traceback
pub fn site(label: &str, size_bytes: u64, count: u64) -> AllocationSite {
    AllocationSite {
        traceback: vec![label.to_string()],
        size_bytes,
        count,
    }
}

/// Bundle mock facilities into a [`SampleSource`]
pub fn mock_source(
    accounting: Arc<ScriptedAccounting>,
    tracer: Arc<ScriptedTracer>,
    reclaimer: Arc<CountingReclaimer>,
) -> SampleSource {
    SampleSource::new(accounting, tracer, reclaimer)
}
