use std::time::Duration;

use chrono::Utc;

/// Wall clock in epoch milliseconds. Components take it as a trait object so
/// tests can drive it together with paused tokio time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        current_epoch_ms()
    }
}

/// Returns the current epoch milliseconds.
pub fn current_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a millisecond delta to a `Duration`, clamping negatives to zero.
pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// `MM:SS`, zero-padded. Minutes are not capped at 59.
pub fn format_mm_ss(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_pads() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(90), "01:30");
        assert_eq!(format_mm_ss(605), "10:05");
        assert_eq!(format_mm_ss(-3), "00:00");
    }

    #[test]
    fn negative_millis_clamp_to_zero() {
        assert_eq!(millis(-10), Duration::ZERO);
        assert_eq!(millis(1500), Duration::from_millis(1500));
    }
}
