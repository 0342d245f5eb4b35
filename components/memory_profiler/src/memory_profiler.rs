//! Memory Profiler engine
//!
//! Owns the sample history and exposes the four profiling operations:
//! sampling, top-consumer ranking, leak detection and forced collection.
//! Every operation is synchronous; periodic sampling is left to the caller.

use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::errors::{ProfilerError, Result};
use crate::history::SampleHistory;
use crate::leak_detector;
use crate::source::SampleSource;
use crate::types::{
    bytes_to_mb, AllocationSite, CollectionResult, ErrorInfo, LeakAssessment, ProfilerStatus,
    SampleRecord, TopConsumerEntry,
};

/// History capacity used when none is configured
pub const DEFAULT_MAX_SAMPLES: usize = 100;

/// Entries returned by `top_consumers` when no limit is given
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Construction-time profiler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
    max_samples: NonZeroUsize,
}

impl ProfilerConfig {
    /// Rejects a zero capacity
    pub fn new(max_samples: usize) -> Result<Self> {
        NonZeroUsize::new(max_samples)
            .map(|max_samples| Self { max_samples })
            .ok_or_else(|| {
                ProfilerError::InvalidConfiguration(
                    "maxSamples must be a positive integer, got 0".to_string(),
                )
            })
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples.get()
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_samples: NonZeroUsize::new(DEFAULT_MAX_SAMPLES).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Sampling engine with bounded history
#[derive(Debug)]
pub struct MemoryProfiler {
    /// Lifecycle flag; sampling works in either state
    running: AtomicBool,
    history: Mutex<SampleHistory>,
    source: SampleSource,
}

impl MemoryProfiler {
    pub fn new(config: ProfilerConfig, source: SampleSource) -> Self {
        debug!(
            "Creating memory profiler with capacity {}",
            config.max_samples()
        );
        Self {
            running: AtomicBool::new(false),
            history: Mutex::new(SampleHistory::new(config.max_samples)),
            source,
        }
    }

    /// Profiler over the current process's host facilities
    pub fn system(config: ProfilerConfig) -> Self {
        Self::new(config, SampleSource::system())
    }

    /// Move to Running. No-op if already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Memory profiler already running");
            return;
        }
        debug!("Memory profiler started");
    }

    /// Move to Stopped. No-op if already stopped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Memory profiler already stopped");
            return;
        }
        debug!("Memory profiler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take one sample and append it to history
    ///
    /// Host failures come back as an error record, which is stored like any
    /// other sample.
    pub fn collect_stats(&self) -> SampleRecord {
        // Sampling under the lock keeps insertion order chronological
        let mut history = self.history.lock();
        let record = self.source.collect();
        if let Some(evicted) = history.push(record.clone()) {
            debug!("Evicted sample from {}", evicted.timestamp());
        }
        record
    }

    /// Rank live allocation sites by attributed bytes
    pub fn top_consumers(&self, limit: usize) -> std::result::Result<Vec<TopConsumerEntry>, ErrorInfo> {
        match self.source.snapshot() {
            Ok(sites) => Ok(rank_sites(sites, limit)),
            Err(e) => {
                warn!("Allocation snapshot failed: {}", e);
                Err(ErrorInfo::new(e.to_string(), self.source.now_millis()))
            }
        }
    }

    /// Run the leak heuristic over the newest history window
    pub fn detect_leak(&self) -> LeakAssessment {
        let assessment = leak_detector::detect_leak(&self.history.lock());
        if assessment.is_leak_detected() {
            debug!("Leak heuristic flagged sustained growth");
        }
        assessment
    }

    /// Sample, force a reclamation pass, sample again
    ///
    /// Both samples land in history even when one of the three steps fails;
    /// the first failure is then returned instead of a result.
    pub fn force_collection(&self) -> std::result::Result<CollectionResult, ErrorInfo> {
        let before = self.collect_stats();
        let reclaimed = self.source.force_collect();
        let after = self.collect_stats();

        let objects_collected = reclaimed.map_err(|e| {
            warn!("Forced collection failed: {}", e);
            ErrorInfo::new(e.to_string(), after.timestamp())
        })?;
        let before = before.as_result().map_err(ErrorInfo::clone)?;
        let after = after.as_result().map_err(ErrorInfo::clone)?;

        let freed_bytes = i128::from(before.rss) - i128::from(after.rss);
        let result = CollectionResult {
            objects_collected,
            memory_freed_mb: bytes_to_mb(freed_bytes as f64),
            before_rss_mb: bytes_to_mb(before.rss as f64),
            after_rss_mb: bytes_to_mb(after.rss as f64),
        };

        debug!(
            "Forced collection: {} objects, {:.3} MB freed",
            result.objects_collected, result.memory_freed_mb
        );
        Ok(result)
    }

    /// Copy of history, oldest first
    pub fn history(&self) -> Vec<SampleRecord> {
        self.history.lock().to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.history.lock().capacity()
    }

    pub fn status(&self) -> ProfilerStatus {
        let history = self.history.lock();
        ProfilerStatus {
            running: self.is_running(),
            samples: history.len(),
            capacity: history.capacity(),
        }
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }
}

/// Largest sites first, truncated to `limit`, ranked from 1
fn rank_sites(mut sites: Vec<AllocationSite>, limit: usize) -> Vec<TopConsumerEntry> {
    sites.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    sites
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, site)| TopConsumerEntry {
            rank: index + 1,
            site_label: site.label().to_string(),
            size_mb: bytes_to_mb(site.size_bytes as f64),
            count: site.count,
        })
        .collect()
}
