use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Runs
    runs_started: AtomicUsize,
    runs_succeeded: AtomicUsize,
    runs_failed: AtomicUsize,

    // Timing (in microseconds)
    total_run_time_us: AtomicU64,

    // Counts
    collector_failures: AtomicUsize,
    candidates_collected: AtomicUsize,
    candidates_malformed: AtomicUsize,
    new_listings: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs_started: AtomicUsize::new(0),
            runs_succeeded: AtomicUsize::new(0),
            runs_failed: AtomicUsize::new(0),
            total_run_time_us: AtomicU64::new(0),
            collector_failures: AtomicUsize::new(0),
            candidates_collected: AtomicUsize::new(0),
            candidates_malformed: AtomicUsize::new(0),
            new_listings: AtomicUsize::new(0),
        })
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run(&self, duration: Duration, success: bool) {
        self.total_run_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_collector_failure(&self) {
        self.collector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidates(&self, collected: usize, malformed: usize) {
        self.candidates_collected.fetch_add(collected, Ordering::Relaxed);
        self.candidates_malformed.fetch_add(malformed, Ordering::Relaxed);
    }

    pub fn record_new_listings(&self, count: usize) {
        self.new_listings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = self.runs_succeeded.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed);

        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            avg_run_time_ms: avg_time_ms(&self.total_run_time_us, finished),
            collector_failures: self.collector_failures.load(Ordering::Relaxed),
            candidates_collected: self.candidates_collected.load(Ordering::Relaxed),
            candidates_malformed: self.candidates_malformed.load(Ordering::Relaxed),
            new_listings: self.new_listings.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total_us.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub avg_run_time_ms: f64,
    pub collector_failures: usize,
    pub candidates_collected: usize,
    pub candidates_malformed: usize,
    pub new_listings: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_averages_finished_runs() {
        let metrics = Metrics::new();
        metrics.record_run_started();
        metrics.record_run_started();
        metrics.record_run(Duration::from_millis(30), true);
        metrics.record_run(Duration::from_millis(10), false);
        metrics.record_collector_failure();
        metrics.record_candidates(12, 2);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.avg_run_time_ms, 20.0);
        assert_eq!(snapshot.collector_failures, 1);
        assert_eq!(snapshot.candidates_malformed, 2);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(Metrics::new().snapshot().avg_run_time_ms, 0.0);
    }
}
