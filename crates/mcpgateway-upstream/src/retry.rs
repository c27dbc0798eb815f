//! Retry backoff with full jitter.

use std::time::Duration;

/// Delay before retry `attempt` (0-based): exponential from `base`,
/// capped at `cap`, with full jitter (uniform in `[0, backoff]`).
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(16));
    let ceiling = exp.min(cap);
    ceiling.mul_f64(fastrand::f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(8);
        for attempt in 0..10 {
            for _ in 0..50 {
                assert!(backoff_delay(attempt, base, cap) <= cap);
            }
        }
    }

    #[test]
    fn early_attempts_stay_under_exponential_ceiling() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(8);
        for _ in 0..50 {
            assert!(backoff_delay(0, base, cap) <= Duration::from_millis(250));
            assert!(backoff_delay(1, base, cap) <= Duration::from_millis(500));
        }
    }
}
