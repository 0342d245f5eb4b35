//! Unit tests for MemoryProfiler
//!
//! Drive the engine with mock host facilities so every reading is known.

use memory_profiler::mock_host::{
    mock_source, site, CountingReclaimer, ScriptedAccounting, ScriptedTracer,
};
use memory_profiler::{
    HostError, MemoryProfiler, ProfilerConfig, ProfilerError, SampleRecord, UNKNOWN_SITE,
};
use std::sync::Arc;
use std::thread;

const MB: u64 = 1024 * 1024;

struct Fixture {
    accounting: Arc<ScriptedAccounting>,
    tracer: Arc<ScriptedTracer>,
    profiler: Arc<MemoryProfiler>,
}

fn fixture(capacity: usize, sites: Vec<memory_profiler::AllocationSite>) -> Fixture {
    fixture_with_rss(capacity, sites, &[MB])
}

fn fixture_with_rss(
    capacity: usize,
    sites: Vec<memory_profiler::AllocationSite>,
    rss: &[u64],
) -> Fixture {
    let accounting = Arc::new(ScriptedAccounting::with_rss(rss));
    let tracer = Arc::new(ScriptedTracer::new(sites));
    let source = mock_source(
        accounting.clone(),
        tracer.clone(),
        Arc::new(CountingReclaimer::new(0)),
    );
    Fixture {
        accounting,
        tracer,
        profiler: Arc::new(MemoryProfiler::new(
            ProfilerConfig::new(capacity).unwrap(),
            source,
        )),
    }
}

#[test]
fn test_profiler_creation() {
    let f = fixture(100, vec![]);
    assert!(!f.profiler.is_running());
    assert_eq!(f.profiler.history_len(), 0);
    assert_eq!(f.profiler.capacity(), 100);
}

#[test]
fn test_max_usize_capacity_is_usable() {
    let f = fixture(usize::MAX, vec![]);
    assert_eq!(f.profiler.capacity(), usize::MAX);

    for _ in 0..3 {
        f.profiler.collect_stats();
    }
    assert_eq!(f.profiler.history_len(), 3);
}

#[test]
fn test_zero_max_samples_is_configuration_error() {
    match ProfilerConfig::new(0) {
        Err(ProfilerError::InvalidConfiguration(message)) => {
            assert!(message.contains("maxSamples"))
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_history_length_is_min_of_calls_and_capacity() {
    let f = fixture(5, vec![]);
    for calls in 1..=12 {
        f.profiler.collect_stats();
        assert_eq!(f.profiler.history_len(), calls.min(5));
    }
}

#[test]
fn test_eviction_is_fifo() {
    let f = fixture_with_rss(3, vec![], &[MB, 2 * MB, 3 * MB, 4 * MB, 5 * MB]);
    for _ in 0..5 {
        f.profiler.collect_stats();
    }

    let rss: Vec<u64> = f
        .profiler
        .history()
        .iter()
        .map(|record| record.sample().unwrap().rss)
        .collect();
    assert_eq!(rss, vec![3 * MB, 4 * MB, 5 * MB]);
}

#[test]
fn test_collection_failure_is_stored_as_error_record() {
    let f = fixture(10, vec![]);
    f.profiler.collect_stats();
    f.accounting.push_failure("permission denied");

    let record = f.profiler.collect_stats();
    assert!(record.is_error());
    match &record {
        SampleRecord::Failed(info) => assert!(info.error.contains("permission denied")),
        SampleRecord::Measured(_) => panic!("expected error record"),
    }

    let value = serde_json::to_value(&record).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(f.profiler.history_len(), 2);
}

#[test]
fn test_timestamps_non_decreasing() {
    let f = fixture(50, vec![]);
    for _ in 0..50 {
        f.profiler.collect_stats();
    }
    let history = f.profiler.history();
    assert!(history
        .windows(2)
        .all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn test_top_consumers_properties() {
    let sites = (1..=15)
        .map(|i| site(&format!("src/module_{}.rs:{}", i, i * 10), i * MB, i))
        .collect();
    let f = fixture(10, sites);

    let entries = f.profiler.top_consumers(10).unwrap();
    assert_eq!(entries.len(), 10);
    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.rank, index + 1);
    }
    assert!(entries.windows(2).all(|w| w[0].size_mb >= w[1].size_mb));
    assert_eq!(entries[0].site_label, "src/module_15.rs:150");
    assert_eq!(entries[0].size_mb, 15.0);
    assert_eq!(entries[0].count, 15);
}

#[test]
fn test_top_consumers_fewer_sites_than_limit() {
    let f = fixture(10, vec![site("src/a.rs:1", MB, 1)]);
    let entries = f.profiler.top_consumers(10).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_top_consumers_unattributed_site() {
    let unattributed = memory_profiler::AllocationSite {
        traceback: vec![],
        size_bytes: MB,
        count: 1,
    };
    let f = fixture(10, vec![unattributed]);
    assert_eq!(f.profiler.top_consumers(10).unwrap()[0].site_label, UNKNOWN_SITE);
}

#[test]
fn test_top_consumers_failure_does_not_touch_history() {
    let f = fixture(10, vec![]);
    f.tracer.fail_with(HostError::TracerNotStarted);

    let info = f.profiler.top_consumers(10).unwrap_err();
    assert!(info.error.contains("not tracing"));
    assert!(info.timestamp > 0);
    assert_eq!(f.profiler.history_len(), 0);
}

#[test]
fn test_concurrent_collection_respects_capacity() {
    let f = fixture(25, vec![]);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let profiler = f.profiler.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    profiler.collect_stats();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = f.profiler.history();
    assert_eq!(history.len(), 25);
    assert!(history
        .windows(2)
        .all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn test_status_reflects_lifecycle() {
    let f = fixture(4, vec![]);
    f.profiler.start();
    f.profiler.collect_stats();

    let status = f.profiler.status();
    assert!(status.running);
    assert_eq!(status.samples, 1);
    assert_eq!(status.capacity, 4);

    f.profiler.stop();
    assert!(!f.profiler.status().running);
}
