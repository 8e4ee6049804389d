//! Poll interval with jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the next poll cycle: `interval` plus up to 10% jitter.
pub fn poll_delay(interval: Duration) -> Duration {
    let base_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);

    let jitter_range = base_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(base_ms.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_delay_bounds() {
        for _ in 0..100 {
            let delay = poll_delay(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_huge_intervals_saturate() {
        let max = Duration::from_millis(u64::MAX);
        assert_eq!(poll_delay(max), max);
        assert_eq!(poll_delay(Duration::MAX), max);
    }

    #[test]
    fn test_small_intervals_have_no_jitter() {
        assert_eq!(poll_delay(Duration::from_millis(5)), Duration::from_millis(5));
        assert_eq!(poll_delay(Duration::ZERO), Duration::ZERO);
    }
}
