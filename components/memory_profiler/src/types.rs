//! Type definitions for the memory profiler
//!
//! Wire names are camelCase. Byte fields stay in bytes; every `...MB` field
//! is mebibytes (bytes / 1024 / 1024). Timestamps are milliseconds since the
//! Unix epoch and durations are seconds.

use serde::{Deserialize, Serialize};

/// Bytes in one mebibyte, the unit behind every `...MB` field
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Label reported for allocation sites the tracer cannot attribute
pub const UNKNOWN_SITE: &str = "unknown";

/// Convert a (possibly negative) byte count to mebibytes
pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}

// ============================================================================
// Samples
// ============================================================================

/// One successful measurement of the process's memory footprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Milliseconds since epoch, non-decreasing across a run
    pub timestamp: u64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Virtual memory size in bytes
    pub vms: u64,
    /// Share of system memory used by this process, 0..=100
    pub percent: f64,
    /// Bytes currently held by traced allocations
    pub traced_current: u64,
    /// Highest `traced_current` seen since tracing started
    pub traced_peak: u64,
    /// Per-generation collection pass counts, oldest generation last
    pub gc_collections: Vec<u64>,
    /// Per-generation objects reclaimed
    pub gc_collected: Vec<u64>,
    /// Per-generation objects that could not be reclaimed
    pub gc_uncollectable: Vec<u64>,
    /// Live objects known to the reclamation subsystem
    pub object_count: u64,
}

/// Error record substituted for a result that could not be produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Failure message
    pub error: String,
    /// When the failure was observed (milliseconds since epoch)
    pub timestamp: u64,
}

impl ErrorInfo {
    pub fn new(error: impl Into<String>, timestamp: u64) -> Self {
        Self {
            error: error.into(),
            timestamp,
        }
    }
}

/// Either a full [`Sample`] or the [`ErrorInfo`] recorded instead of it
///
/// Serialized untagged, so a failed record is just `{error, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SampleRecord {
    Measured(Sample),
    Failed(ErrorInfo),
}

impl SampleRecord {
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Measured(sample) => sample.timestamp,
            Self::Failed(info) => info.timestamp,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The measured sample, if collection succeeded
    pub fn sample(&self) -> Option<&Sample> {
        match self {
            Self::Measured(sample) => Some(sample),
            Self::Failed(_) => None,
        }
    }

    /// View as a `Result`, borrowing either side
    pub fn as_result(&self) -> Result<&Sample, &ErrorInfo> {
        match self {
            Self::Measured(sample) => Ok(sample),
            Self::Failed(info) => Err(info),
        }
    }
}

impl From<Sample> for SampleRecord {
    fn from(sample: Sample) -> Self {
        Self::Measured(sample)
    }
}

impl From<ErrorInfo> for SampleRecord {
    fn from(info: ErrorInfo) -> Self {
        Self::Failed(info)
    }
}

// ============================================================================
// Host facility readings
// ============================================================================

/// Memory accounting reading for the current process
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessMemory {
    pub rss: u64,
    pub vms: u64,
    pub percent: f64,
}

/// Bytes held by traced allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TracedMemory {
    pub current: u64,
    pub peak: u64,
}

/// One allocation site from a tracer snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSite {
    /// Formatted traceback, innermost user frame first. Empty when the
    /// tracer could not attribute the allocation.
    pub traceback: Vec<String>,
    /// Live bytes attributed to this site
    pub size_bytes: u64,
    /// Live allocations attributed to this site
    pub count: u64,
}

impl AllocationSite {
    /// First line of the formatted traceback, or [`UNKNOWN_SITE`]
    pub fn label(&self) -> &str {
        self.traceback
            .first()
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SITE)
    }
}

/// Counters for one reclamation generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    /// Collection passes run over this generation
    pub collections: u64,
    /// Objects reclaimed from this generation
    pub collected: u64,
    /// Objects this generation reported as impossible to reclaim
    pub uncollectable: u64,
}

// ============================================================================
// Derived reports
// ============================================================================

/// Result of the sliding-window leak heuristic
///
/// Serialized with a `status` tag: `{"status": "insufficient_data"}` or
/// `{"status": "analyzed", "isLeakDetected": ..., ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeakAssessment {
    /// Fewer samples than the detection window holds
    InsufficientData,
    Analyzed(LeakReport),
}

impl LeakAssessment {
    pub fn report(&self) -> Option<&LeakReport> {
        match self {
            Self::Analyzed(report) => Some(report),
            Self::InsufficientData => None,
        }
    }

    pub fn is_leak_detected(&self) -> bool {
        self.report().is_some_and(|r| r.is_leak_detected)
    }
}

/// Growth figures over the detection window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeakReport {
    #[serde(rename = "isLeakDetected")]
    pub is_leak_detected: bool,
    /// RSS growth rate in MB per second (negative when memory shrank)
    #[serde(rename = "growthRateMBps")]
    pub growth_rate_mb_per_sec: f64,
    /// RSS growth across the window in MB (signed)
    #[serde(rename = "totalGrowthMB")]
    pub total_growth_mb: f64,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: f64,
    /// Heuristic 0..=100 score proportional to the growth rate magnitude.
    /// Not a statistical confidence interval.
    #[serde(rename = "confidencePercent")]
    pub confidence_percent: f64,
}

/// One ranked allocation site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopConsumerEntry {
    /// 1-based position in the ranking
    pub rank: usize,
    #[serde(rename = "siteLabel")]
    pub site_label: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    pub count: u64,
}

/// Effect of one forced reclamation pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionResult {
    #[serde(rename = "objectsCollected")]
    pub objects_collected: u64,
    /// `beforeRssMB - afterRssMB`; negative when RSS grew during the pass
    #[serde(rename = "memoryFreedMB")]
    pub memory_freed_mb: f64,
    #[serde(rename = "beforeRssMB")]
    pub before_rss_mb: f64,
    #[serde(rename = "afterRssMB")]
    pub after_rss_mb: f64,
}

/// Engine lifecycle and history occupancy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilerStatus {
    pub running: bool,
    /// Records currently held in history
    pub samples: usize,
    /// Maximum records history will hold
    pub capacity: usize,
}
