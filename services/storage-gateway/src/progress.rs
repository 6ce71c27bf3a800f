//! Throttled transfer progress reporting

use std::sync::Arc;
use std::time::{Duration, Instant};

/// One progress observation handed to the caller's sink. Throughput is
/// instantaneous: bytes moved since the previous report, over the time
/// since it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub percent: f64,
    pub throughput_bps: f64,
}

/// Callback invoked with throttled progress reports.
pub type ProgressSink = Arc<dyn Fn(ProgressReport) + Send + Sync>;

/// Throttles per-chunk observations down to the configured cadence, with
/// one guaranteed final 100% report.
pub struct ProgressTracker {
    total: u64,
    cadence: Duration,
    /// Time of the last report, or construction before any report.
    mark: Instant,
    /// Bytes at the last report.
    mark_bytes: u64,
    emitted: bool,
}

impl ProgressTracker {
    pub fn new(total: u64, cadence: Duration) -> Self {
        Self {
            total,
            cadence,
            mark: Instant::now(),
            mark_bytes: 0,
            emitted: false,
        }
    }

    fn report(&mut self, transferred: u64, now: Instant) -> ProgressReport {
        let percent = if self.total == 0 {
            100.0
        } else {
            (transferred as f64 / self.total as f64 * 100.0).min(100.0)
        };
        let window = now.duration_since(self.mark).as_secs_f64();
        let moved = transferred.saturating_sub(self.mark_bytes);
        let throughput_bps = if window > 0.0 {
            moved as f64 / window
        } else {
            0.0
        };
        self.mark = now;
        self.mark_bytes = transferred;
        ProgressReport {
            bytes_transferred: transferred,
            total_bytes: self.total,
            percent,
            throughput_bps,
        }
    }

    /// Offer an observation; returns a report when the cadence has elapsed
    /// since the last emitted one.
    pub fn offer(&mut self, transferred: u64) -> Option<ProgressReport> {
        let now = Instant::now();
        if self.emitted && now.duration_since(self.mark) < self.cadence {
            return None;
        }
        self.emitted = true;
        Some(self.report(transferred, now))
    }

    /// Final report, always emitted and always 100%.
    pub fn finish(mut self, transferred: u64) -> ProgressReport {
        let mut report = self.report(transferred, Instant::now());
        report.percent = 100.0;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_offer_emits_immediately() {
        let mut tracker = ProgressTracker::new(1000, Duration::from_millis(500));
        let report = tracker.offer(100).unwrap();
        assert_eq!(report.bytes_transferred, 100);
        assert_eq!(report.percent, 10.0);
    }

    #[test]
    fn offers_inside_cadence_are_swallowed() {
        let mut tracker = ProgressTracker::new(1000, Duration::from_secs(60));
        assert!(tracker.offer(100).is_some());
        assert!(tracker.offer(200).is_none());
        assert!(tracker.offer(300).is_none());
    }

    #[test]
    fn offers_emit_again_after_cadence() {
        let mut tracker = ProgressTracker::new(1000, Duration::from_millis(0));
        assert!(tracker.offer(100).is_some());
        assert!(tracker.offer(200).is_some());
    }

    #[test]
    fn throughput_covers_only_the_window_since_the_last_report() {
        let mut tracker = ProgressTracker::new(1000, Duration::from_millis(0));
        let first = tracker.offer(500).unwrap();
        assert!(first.throughput_bps >= 0.0);

        // No bytes moved between reports: a cumulative average would still
        // be positive, the per-window rate is exactly zero
        std::thread::sleep(Duration::from_millis(5));
        let stalled = tracker.offer(500).unwrap();
        assert_eq!(stalled.throughput_bps, 0.0);
    }

    #[test]
    fn finish_is_always_full() {
        let tracker = ProgressTracker::new(1000, Duration::from_secs(60));
        let report = tracker.finish(1000);
        assert_eq!(report.percent, 100.0);
        assert_eq!(report.bytes_transferred, 1000);
    }

    #[test]
    fn zero_total_reports_full() {
        let mut tracker = ProgressTracker::new(0, Duration::from_millis(500));
        let report = tracker.offer(0).unwrap();
        assert_eq!(report.percent, 100.0);
    }
}
