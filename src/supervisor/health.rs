//! Exponential backoff for unhealthy worker restarts (`spec.md` §4.8).

use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// `min(MAX_DELAY, BASE_DELAY * 2^attempt)`, `attempt` is 0-based.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    let millis = (BASE_DELAY.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(20), MAX_DELAY);
    }
}
