//! Unit tests for the process-wide allocation tracer
//!
//! This test binary installs `TracingAllocator` as its global allocator, so
//! the tracer observes real allocations here. Tests only ever start the
//! tracer; stopping it would clear traces other tests are reading.

use memory_profiler::{
    AllocationLedger, AllocationTracer, GlobalTracer, HostError, MemoryProfiler, ProfilerConfig,
    Reclaimable, SampleSource, StackKey,
};
use std::hint::black_box;

const MB: usize = 1024 * 1024;

#[test]
fn test_start_is_idempotent() {
    let tracer = GlobalTracer;
    tracer.start();
    tracer.start();
    assert!(tracer.is_tracing());
}

#[test]
fn test_large_allocation_is_traced() {
    let tracer = GlobalTracer;
    tracer.start();

    let block: Vec<u8> = black_box(Vec::with_capacity(8 * MB));
    let traced = tracer.traced_memory();
    assert!(traced.current >= (8 * MB) as u64);
    assert!(traced.peak >= traced.current);

    let sites = tracer.snapshot().unwrap();
    let attributed: u64 = sites.iter().map(|s| s.size_bytes).sum();
    assert!(attributed >= (8 * MB) as u64);
    assert!(sites.windows(2).all(|w| w[0].size_bytes >= w[1].size_bytes));
    assert!(sites.iter().all(|s| !s.label().is_empty()));

    drop(black_box(block));
}

#[test]
fn test_system_source_reads_real_process() {
    let profiler = MemoryProfiler::system(ProfilerConfig::default());
    assert!(profiler.source().is_tracing());

    let record = profiler.collect_stats();
    let sample = record.sample().unwrap();
    assert!(sample.rss > 0);
    assert_eq!(sample.gc_collections.len(), 3);

    let entries = profiler.top_consumers(5).unwrap();
    assert!(entries.len() <= 5);
    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.rank, index + 1);
    }

    profiler.force_collection().unwrap();
    assert_eq!(profiler.history_len(), 3);
}

#[test]
fn test_symbol_cache_hook() {
    let tracer = GlobalTracer;
    tracer.start();
    assert_eq!(tracer.name(), "allocation-symbol-cache");

    tracer.snapshot().unwrap();
    let outcome = tracer.reclaim().unwrap();
    assert_eq!(outcome.uncollectable, 0);
}

#[test]
fn test_private_ledger_is_independent() {
    let ledger = AllocationLedger::new();
    assert_eq!(ledger.snapshot(), Err(HostError::TracerNotStarted));

    ledger.start();
    ledger.record_alloc(0x1000, 4096, StackKey::from_frames(&[0xdead]));
    let sites = ledger
        .snapshot_with(|_| vec!["src/worker.rs:12".to_string()])
        .unwrap();

    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].label(), "src/worker.rs:12");
    assert_eq!(sites[0].size_bytes, 4096);
}

#[test]
fn test_source_starts_global_tracer() {
    let source = SampleSource::system();
    assert!(source.is_tracing());
    assert!(GlobalTracer.is_tracing());
}
