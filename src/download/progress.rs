//! Progress reporting from transports to their caller.

use std::time::{Duration, Instant};

/// Receives human-readable progress messages and throughput samples.
///
/// Implementations must be cheap: transports call these from their copy
/// loops (already throttled to roughly once per second).
pub trait ProgressSink: Send + Sync {
    /// A free-text progress message (e.g. elapsed stream time).
    fn on_progress(&self, message: &str);

    /// A throughput sample such as `"2.5x"` or `"4.20 MB/s"`.
    fn on_speed(&self, speed: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _message: &str) {}

    fn on_speed(&self, _speed: &str) {}
}

/// One parsed observation from a remux progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressSample {
    /// Stream time written so far, in seconds.
    Elapsed(u64),
    /// Throughput as reported by the process.
    Speed(String),
}

/// Gate that opens at most once per interval, measured from its creation.
#[derive(Debug)]
pub(crate) struct Throttle {
    interval: Duration,
    last: Instant,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub(crate) fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    /// Returns true (and re-arms the gate) when the interval has elapsed since
    /// the last time it opened.
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Formats a byte count over a wall-clock span as `"X.XX MB/s"`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_rate(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    format!("{:.2} MB/s", bytes as f64 / 1024.0 / 1024.0 / secs)
}

/// Formats whole seconds as `HH:MM:SS`.
#[must_use]
pub fn format_elapsed(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_waits_one_interval_then_opens() {
        let start = Instant::now();
        let mut throttle = Throttle::starting_at(Duration::from_secs(1), start);
        assert!(!throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(500)));
        assert!(throttle.ready(start + Duration::from_millis(1000)));
        assert!(!throttle.ready(start + Duration::from_millis(1500)));
        assert!(throttle.ready(start + Duration::from_millis(2100)));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(2 * 1024 * 1024, Duration::from_secs(1)), "2.00 MB/s");
        assert_eq!(format_rate(1024 * 1024, Duration::from_secs(2)), "0.50 MB/s");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
    }
}
