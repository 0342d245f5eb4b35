//! Sliding-window leak heuristic
//!
//! Looks only at the most recent [`LEAK_WINDOW`] successful samples and
//! compares the oldest and newest RSS in that window. The score it produces
//! is a linear, saturating mapping of the growth rate onto 0..=100; it is a
//! heuristic, not a statistical confidence interval.

use tracing::debug;

use crate::history::SampleHistory;
use crate::types::{bytes_to_mb, LeakAssessment, LeakReport, Sample};

/// Number of most recent samples the heuristic inspects
pub const LEAK_WINDOW: usize = 5;

/// Growth rate above which a leak is reported (1 MiB per second)
pub const LEAK_THRESHOLD_BYTES_PER_SEC: f64 = 1024.0 * 1024.0;

/// Assess the newest window of `history` for sustained RSS growth
///
/// Error records are skipped; fewer than [`LEAK_WINDOW`] successful samples
/// yields [`LeakAssessment::InsufficientData`].
pub fn detect_leak(history: &SampleHistory) -> LeakAssessment {
    // Newest first
    let window: Vec<&Sample> = history.measured().rev().take(LEAK_WINDOW).collect();
    if window.len() < LEAK_WINDOW {
        debug!(
            "Leak detection needs {} samples, have {}",
            LEAK_WINDOW,
            window.len()
        );
        return LeakAssessment::InsufficientData;
    }

    match (window.last(), window.first()) {
        (Some(first), Some(last)) => LeakAssessment::Analyzed(analyze(first, last)),
        _ => LeakAssessment::InsufficientData,
    }
}

fn analyze(first: &Sample, last: &Sample) -> LeakReport {
    let time_diff = last.timestamp.saturating_sub(first.timestamp) as f64 / 1000.0;
    let memory_growth = (i128::from(last.rss) - i128::from(first.rss)) as f64;

    // Colliding timestamps would divide by zero
    let growth_rate = if time_diff > 0.0 {
        memory_growth / time_diff
    } else {
        0.0
    };

    let confidence = (growth_rate.abs() / LEAK_THRESHOLD_BYTES_PER_SEC * 100.0).min(100.0);

    LeakReport {
        is_leak_detected: growth_rate > LEAK_THRESHOLD_BYTES_PER_SEC,
        growth_rate_mb_per_sec: bytes_to_mb(growth_rate),
        total_growth_mb: bytes_to_mb(memory_growth),
        duration_seconds: time_diff,
        confidence_percent: confidence,
    }
}
