//! Unit tests for the sliding-window leak heuristic

use memory_profiler::{
    detect_leak, ErrorInfo, LeakAssessment, Sample, SampleHistory, LEAK_WINDOW,
};
use std::num::NonZeroUsize;

const MB: u64 = 1024 * 1024;

fn sample(timestamp: u64, rss: u64) -> Sample {
    Sample {
        timestamp,
        rss,
        vms: rss,
        percent: 0.0,
        traced_current: 0,
        traced_peak: 0,
        gc_collections: vec![0, 0, 0],
        gc_collected: vec![0, 0, 0],
        gc_uncollectable: vec![0, 0, 0],
        object_count: 0,
    }
}

fn history(points: &[(u64, u64)]) -> SampleHistory {
    let mut history = SampleHistory::new(NonZeroUsize::new(100).unwrap());
    for &(timestamp, rss) in points {
        history.push(sample(timestamp, rss).into());
    }
    history
}

#[test]
fn test_window_is_five_samples() {
    assert_eq!(LEAK_WINDOW, 5);
}

#[test]
fn test_empty_history_is_insufficient() {
    assert_eq!(detect_leak(&history(&[])), LeakAssessment::InsufficientData);
}

#[test]
fn test_four_samples_is_insufficient() {
    let points = [(0, 0), (1000, 10 * MB), (2000, 20 * MB), (3000, 30 * MB)];
    let assessment = detect_leak(&history(&points));

    assert_eq!(assessment, LeakAssessment::InsufficientData);
    assert_eq!(
        serde_json::to_value(&assessment).unwrap(),
        serde_json::json!({"status": "insufficient_data"})
    );
}

#[test]
fn test_steady_memory() {
    let points: Vec<(u64, u64)> = (0..5).map(|i| (i * 1000, 100 * MB)).collect();
    let report = detect_leak(&history(&points)).report().cloned().unwrap();

    assert_eq!(report.growth_rate_mb_per_sec, 0.0);
    assert_eq!(report.total_growth_mb, 0.0);
    assert!(!report.is_leak_detected);
}

#[test]
fn test_step_growth_reports_leak() {
    let points = [(0, 0), (1000, 0), (2000, 0), (3000, 0), (4000, 5 * MB)];
    let assessment = detect_leak(&history(&points));
    let report = assessment.report().unwrap();

    assert_eq!(report.total_growth_mb, 5.0);
    assert_eq!(report.duration_seconds, 4.0);
    assert!((report.growth_rate_mb_per_sec - 1.25).abs() < 1e-9);
    assert!(report.is_leak_detected);
    assert_eq!(report.confidence_percent, 100.0);

    let value = serde_json::to_value(&assessment).unwrap();
    assert_eq!(value["status"], "analyzed");
    assert_eq!(value["isLeakDetected"], true);
}

#[test]
fn test_rate_exactly_at_threshold_is_not_a_leak() {
    // 4 MB over 4 s is exactly 1 MB/s
    let points = [(0, 0), (1000, MB), (2000, 2 * MB), (3000, 3 * MB), (4000, 4 * MB)];
    let report = detect_leak(&history(&points)).report().cloned().unwrap();

    assert!(!report.is_leak_detected);
    assert_eq!(report.confidence_percent, 100.0);
}

#[test]
fn test_confidence_always_in_range() {
    for growth in [0, 1, MB / 3, MB, 7 * MB, 900 * MB] {
        let points = [(0, 0), (1000, 0), (2000, 0), (3000, 0), (4000, growth)];
        let report = detect_leak(&history(&points)).report().cloned().unwrap();
        assert!((0.0..=100.0).contains(&report.confidence_percent));
    }
}

#[test]
fn test_window_ignores_older_samples() {
    let mut points = vec![(0, 0)];
    points.extend((1..=5).map(|i| (i * 1000, 50 * MB)));
    let report = detect_leak(&history(&points)).report().cloned().unwrap();

    assert_eq!(report.duration_seconds, 4.0);
    assert!(!report.is_leak_detected);
}

#[test]
fn test_error_records_do_not_count_toward_window() {
    let mut history = history(&[(0, 0), (1000, 0), (2000, 0)]);
    history.push(ErrorInfo::new("transient", 2500).into());
    history.push(ErrorInfo::new("transient", 2600).into());
    assert_eq!(detect_leak(&history), LeakAssessment::InsufficientData);

    history.push(sample(3000, 0).into());
    history.push(sample(4000, 8 * MB).into());
    assert!(detect_leak(&history).is_leak_detected());
}
