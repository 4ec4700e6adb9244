// Attempt-scaled backoff for webhook delivery
//
// delay = base × attempt, so a 1s base waits 1s, 2s, 3s, ... No jitter.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Delay before the retry that follows a failed attempt.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.max(1))
}

/// Wall-clock time at which the next attempt becomes due.
pub fn next_retry_at(now: DateTime<Utc>, base: Duration, attempt: u32) -> DateTime<Utc> {
    let delay = retry_delay(base, attempt);
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_schedule() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 3), Duration::from_secs(3));
    }

    #[test]
    fn test_attempt_zero_uses_base() {
        let base = Duration::from_millis(250);
        assert_eq!(retry_delay(base, 0), base);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        assert_eq!(retry_delay(Duration::MAX, 5), Duration::MAX);
        let now = Utc::now();
        assert_eq!(next_retry_at(now, Duration::MAX, 5), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_next_retry_at_is_offset_from_now() {
        let now = Utc::now();
        let next = next_retry_at(now, Duration::from_secs(30), 2);
        assert_eq!((next - now).num_seconds(), 60);
    }
}
