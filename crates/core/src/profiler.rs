//! Named timing accumulators for a migration run.
//!
//! The engine owns one [`Timer`] and opens a [`ProfilerScope`] around every
//! collector, kernel and correlation call. Scopes record into the timer when
//! dropped.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::info;

/// Accumulated timings of one name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerEntry {
    /// Number of recorded scopes
    pub count: u64,
    /// Sum of all scopes
    pub total: Duration,
    /// Longest single scope
    pub max: Duration,
}

impl TimerEntry {
    /// Mean scope duration
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

/// Timing context passed explicitly to whoever needs it
#[derive(Debug, Default)]
pub struct Timer {
    entries: RefCell<FxHashMap<&'static str, TimerEntry>>,
}

impl Timer {
    /// Empty timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scope that records under `name` when dropped
    pub fn scope(&self, name: &'static str) -> ProfilerScope<'_> {
        ProfilerScope {
            timer: self,
            name,
            start: Instant::now(),
        }
    }

    /// Add one measurement
    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(name).or_default();
        entry.count += 1;
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);
    }

    /// Timings recorded under `name`
    pub fn entry(&self, name: &str) -> Option<TimerEntry> {
        self.entries.borrow().get(name).copied()
    }

    /// All entries, longest total first
    pub fn summary(&self) -> Vec<(&'static str, TimerEntry)> {
        let mut rows: Vec<_> = self.entries.borrow().iter().map(|(k, v)| (*k, *v)).collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(b.0)));
        rows
    }

    /// Log the summary at `info!`
    pub fn log_summary(&self) {
        for (name, entry) in self.summary() {
            info!(
                name,
                count = entry.count,
                total_ms = entry.total.as_secs_f64() * 1000.0,
                average_ms = entry.average().as_secs_f64() * 1000.0,
                max_ms = entry.max.as_secs_f64() * 1000.0,
                "Timer"
            );
        }
    }

    /// Forget every measurement
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// A profiling scope that measures elapsed time using RAII.
pub struct ProfilerScope<'a> {
    timer: &'a Timer,
    name: &'static str,
    start: Instant,
}

impl ProfilerScope<'_> {
    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope<'_> {
    fn drop(&mut self) {
        self.timer.record(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_profiler_scope_records_on_drop() {
        let timer = Timer::new();
        {
            let scope = timer.scope("ForwardCollector::SaveForward");
            thread::sleep(Duration::from_millis(5));
            assert!(scope.elapsed_ms() >= 5.0);
        }
        let entry = timer.entry("ForwardCollector::SaveForward").unwrap();
        assert_eq!(entry.count, 1);
        assert!(entry.total >= Duration::from_millis(5));
    }

    #[test]
    fn test_summary_sorted_by_total() {
        let timer = Timer::new();
        timer.record("a", Duration::from_millis(1));
        timer.record("b", Duration::from_millis(3));
        timer.record("a", Duration::from_millis(1));
        let summary = timer.summary();
        assert_eq!(summary[0].0, "b");
        assert_eq!(summary[1].1.count, 2);
        assert_eq!(summary[1].1.average(), Duration::from_millis(1));
        assert_eq!(summary[1].1.max, Duration::from_millis(1));
        timer.clear();
        assert!(timer.summary().is_empty());
    }
}
