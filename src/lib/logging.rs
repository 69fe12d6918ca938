//! Formatting helpers for log output and the operation timer used by the commands.

use std::time::{Duration, Instant};

/// Formats an integer with thousands separators.
///
/// # Examples
///
/// ```
/// use linestream_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();
    groups.join(",")
}

/// Formats a byte count using binary units (B, KiB, MiB, GiB).
///
/// ```
/// use linestream_lib::logging::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(3 << 20), "3.0 MiB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Formats a duration in human-readable form.
///
/// # Examples
///
/// ```
/// use linestream_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (mins, rem) = (secs / 60, secs % 60);
        if rem == 0 { format!("{mins}m") } else { format!("{mins}m {rem}s") }
    } else {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a per-second rate of `unit`s, e.g. `"1,000 lines/s"`.
///
/// Very short durations report the raw count rather than dividing by ~0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration, unit: &str) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} {unit}/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} {unit}/s", format_count(rate as u64))
    } else {
        format!("{:.1} {unit}/min", rate * 60.0)
    }
}

/// Logs the start of an operation and, on completion, its counts and throughput.
///
/// ```no_run
/// use linestream_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Counting lines in calls.vcf.gz");
/// // ... read the file ...
/// timer.log_completion(1_000_000, 250 << 20);
/// ```
#[derive(Debug)]
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a timer and logs `"{operation} ..."`.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the line and decoded byte counts with their rates.
    pub fn log_completion(&self, lines: u64, bytes: u64) {
        let duration = self.elapsed();
        log::info!(
            "{} completed: {} lines, {} in {} ({}, {})",
            self.operation,
            format_count(lines),
            format_bytes(bytes),
            format_duration(duration),
            format_rate(lines, duration, "lines"),
            format_bytes_rate(bytes, duration)
        );
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_bytes_rate(bytes: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64().max(0.001);
    format!("{}/s", format_bytes((bytes as f64 / secs) as u64))
}
