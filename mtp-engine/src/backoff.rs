use std::time::Duration;

use mtp_quirks::BusyBackoff;
use rand::Rng;

/// Compute the delay before retry attempt `n` (0-based) under `policy`,
/// per §4.3 "Backoff & retry": `base_ms * 2^n` with uniform jitter
/// `±jitter_pct`.
pub fn delay_for_attempt(policy: BusyBackoff, attempt: u32) -> Duration {
    let base = policy.base_ms.saturating_mul(1u64 << attempt.min(16));
    if policy.jitter_pct == 0 {
        return Duration::from_millis(base);
    }
    let jitter_range = (base * policy.jitter_pct as u64) / 100;
    let mut rng = rand::thread_rng();
    let offset: i64 = rng.gen_range(-(jitter_range as i64)..=(jitter_range as i64));
    let millis = (base as i64 + offset).max(0) as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jitter_is_deterministic_exponential() {
        let policy = BusyBackoff {
            retries: 3,
            base_ms: 10,
            jitter_pct: 0,
        };
        assert_eq!(delay_for_attempt(policy, 0), Duration::from_millis(10));
        assert_eq!(delay_for_attempt(policy, 1), Duration::from_millis(20));
        assert_eq!(delay_for_attempt(policy, 2), Duration::from_millis(40));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BusyBackoff {
            retries: 3,
            base_ms: 100,
            jitter_pct: 20,
        };
        for _ in 0..50 {
            let d = delay_for_attempt(policy, 1).as_millis() as i64;
            assert!((160..=240).contains(&d), "delay {d} out of expected [160,240] range");
        }
    }
}
