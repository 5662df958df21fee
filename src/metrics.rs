//! Optional metrics sink for ignition instrumentation.
//!
//! The coordinator never requires a concrete metrics backend: it accepts
//! an `Arc<dyn IgnitionMetricsSink>` via [`crate::options::CoordinatorOptions`]
//! and is a no-op without one.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::signal::SignalStatus;

/// Receives per-signal and per-ignition timing/outcome events.
pub trait IgnitionMetricsSink: Send + Sync {
    fn record_signal(&self, name: &str, status: SignalStatus, duration: Duration);
    fn record_ignition(&self, total_duration: Duration, timed_out: bool);
}

/// Per-signal timing distribution, recomputed on each `record`.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: u64,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
    recent: Vec<Duration>,
}

impl TimingStats {
    fn new() -> Self {
        Self {
            count: 0,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            recent: Vec::with_capacity(100),
        }
    }

    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.total_duration += duration;
        if self.recent.len() >= 100 {
            self.recent.remove(0);
        }
        self.recent.push(duration);
    }

    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }

    pub fn p95_duration(&self) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted = self.recent.clone();
        sorted.sort();
        let index = ((sorted.len() as f64) * 0.95) as usize;
        sorted.get(index.min(sorted.len() - 1)).copied().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Default)]
struct IgnitionCounters {
    total_ignitions: u64,
    timed_out_ignitions: u64,
    total_duration: Duration,
}

/// In-memory [`IgnitionMetricsSink`] suitable for tests and simple
/// deployments; production backends implement the trait directly.
#[derive(Default)]
pub struct MetricsCollector {
    per_signal: RwLock<HashMap<String, TimingStats>>,
    status_counts: RwLock<HashMap<SignalStatus, u64>>,
    ignitions: RwLock<IgnitionCounters>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timing_for(&self, name: &str) -> Option<TimingStats> {
        self.per_signal.read().unwrap().get(name).cloned()
    }

    pub fn status_count(&self, status: SignalStatus) -> u64 {
        *self.status_counts.read().unwrap().get(&status).unwrap_or(&0)
    }

    pub fn total_ignitions(&self) -> u64 {
        self.ignitions.read().unwrap().total_ignitions
    }
}

impl IgnitionMetricsSink for MetricsCollector {
    fn record_signal(&self, name: &str, status: SignalStatus, duration: Duration) {
        self.per_signal
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(TimingStats::new)
            .record(duration);
        *self.status_counts.write().unwrap().entry(status).or_insert(0) += 1;
    }

    fn record_ignition(&self, total_duration: Duration, timed_out: bool) {
        let mut counters = self.ignitions.write().unwrap();
        counters.total_ignitions += 1;
        counters.total_duration += total_duration;
        if timed_out {
            counters.timed_out_ignitions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_signal_timing() {
        let collector = MetricsCollector::new();
        collector.record_signal("db", SignalStatus::Succeeded, Duration::from_millis(10));
        collector.record_signal("db", SignalStatus::Succeeded, Duration::from_millis(20));

        let stats = collector.timing_for("db").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min_duration, Duration::from_millis(10));
        assert_eq!(stats.max_duration, Duration::from_millis(20));
        assert_eq!(stats.average_duration(), Duration::from_millis(15));
    }

    #[test]
    fn tracks_ignition_counters() {
        let collector = MetricsCollector::new();
        collector.record_ignition(Duration::from_millis(50), false);
        collector.record_ignition(Duration::from_millis(80), true);

        assert_eq!(collector.total_ignitions(), 2);
    }
}
