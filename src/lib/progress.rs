//! Periodic progress logging for long reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;

use crate::logging::{format_count, format_duration};

/// Logs `"{message} {count} ({elapsed})"` each time the running count crosses
/// a multiple of the interval. Safe to share between threads.
///
/// ```
/// use linestream_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Read lines").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Read lines 250 (complete)"
/// ```
#[derive(Debug)]
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
    start: Instant,
}

impl ProgressTracker {
    /// A tracker with the default interval of one million.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            interval: 1_000_000,
            message: message.into(),
            count: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Set the logging interval (values below 1 are treated as 1).
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `additional` to the count, logging once per interval boundary crossed.
    ///
    /// Returns `true` if the new count sits exactly on a boundary.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let count = prev + additional;
        for milestone in (prev / self.interval + 1)..=(count / self.interval) {
            info!(
                "{} {} ({})",
                self.message,
                format_count(milestone * self.interval),
                format_duration(self.start.elapsed())
            );
        }
        count > 0 && count.is_multiple_of(self.interval)
    }

    /// Log the final count unless the last boundary log already showed it.
    pub fn log_final(&self) {
        let count = self.count();
        if count > 0 && !count.is_multiple_of(self.interval) {
            info!("{} {} (complete)", self.message, format_count(count));
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
