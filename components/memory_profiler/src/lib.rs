//! In-process memory profiling
//!
//! Samples the process's memory footprint into a bounded history, ranks the
//! largest allocation sites, flags sustained RSS growth as a potential leak
//! and measures the effect of a forced reclamation pass.
//!
//! # Features
//!
//! - **MemoryProfiler**: the sampling engine and its four operations
//! - **SampleSource**: host facilities behind `MemoryAccounting`,
//!   `AllocationTracer` and `Reclaimer`
//! - **TracingAllocator / GlobalTracer**: process-wide allocation tracing
//! - **ReclaimRegistry**: generational registry of reclaimable caches
//! - **MemoryDomain**: the `Memory` protocol domain

mod errors;
mod history;
mod host;
mod leak_detector;
mod memory_domain;
mod memory_profiler;
pub mod mock_host;
mod reclaim;
mod source;
mod tracer;
mod types;

pub use errors::{HostError, ProfilerError, Result};
pub use history::SampleHistory;
pub use host::SysinfoAccounting;
pub use leak_detector::{detect_leak, LEAK_THRESHOLD_BYTES_PER_SEC, LEAK_WINDOW};
pub use memory_domain::MemoryDomain;
pub use memory_profiler::{MemoryProfiler, ProfilerConfig, DEFAULT_MAX_SAMPLES, DEFAULT_TOP_LIMIT};
pub use reclaim::{ReclaimOutcome, ReclaimRegistry, Reclaimable, DEFAULT_GENERATIONS};
pub use source::{AllocationTracer, MemoryAccounting, Reclaimer, SampleSource};
pub use tracer::{ledger, AllocationLedger, GlobalTracer, StackKey, TracingAllocator, MAX_STACK_DEPTH};
pub use types::*;
