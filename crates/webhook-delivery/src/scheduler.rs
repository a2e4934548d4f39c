/*!
 * Retry Scheduler — capped exponential backoff with full jitter
 */

use chrono::{DateTime, Utc};
use rand::Rng;

/// Backoff parameters. Defaults match the recommended production values.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub base_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_ms: 30_000,
            max_delay_ms: 3_600_000,
            max_attempts: 8,
        }
    }
}

/// Compute the delay before the next attempt, given the attempt number that
/// just failed (`n`, 1-indexed).
///
/// ```text
/// base_delay_ms = min(BASE_MS * 2^(n-1), MAX_DELAY_MS)
/// jitter_ms     = uniform random in [0, base_delay_ms / 2)
/// delay_ms      = base_delay_ms + jitter_ms
/// ```
pub fn backoff_ms(n: i32, config: &SchedulerConfig) -> u64 {
    let exponent = (n - 1).max(0) as u32;
    let base_delay_ms = config
        .base_ms
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(config.max_delay_ms);

    let jitter_ms = if base_delay_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..(base_delay_ms / 2).max(1))
    };

    base_delay_ms + jitter_ms
}

/// Compute the absolute `next_retry_at` timestamp for the delivery that just
/// failed its `n`th attempt.
pub fn next_retry_at(n: i32, config: &SchedulerConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + chrono::Duration::milliseconds(backoff_ms(n, config) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let config = SchedulerConfig::default();

        // Attempt 1: base ~30s, plus up to half-range jitter.
        let d1 = backoff_ms(1, &config);
        assert!(d1 >= 30_000 && d1 < 45_000);

        // Attempt 2: base ~60s.
        let d2 = backoff_ms(2, &config);
        assert!(d2 >= 60_000 && d2 < 90_000);

        // Attempt 3: base ~120s.
        let d3 = backoff_ms(3, &config);
        assert!(d3 >= 120_000 && d3 < 180_000);

        // High attempt: capped at MAX_DELAY_MS, jitter at most half of that.
        let d_high = backoff_ms(20, &config);
        assert!(d_high >= config.max_delay_ms);
        assert!((d_high as f64) <= config.max_delay_ms as f64 * 1.5);
    }

    #[test]
    fn backoff_never_exceeds_one_and_a_half_times_max() {
        let config = SchedulerConfig::default();
        for n in 1..=30 {
            let d = backoff_ms(n, &config);
            assert!(
                (d as f64) <= config.max_delay_ms as f64 * 1.5,
                "attempt {n} delay {d} exceeded 1.5x max"
            );
        }
    }

    #[test]
    fn next_retry_at_is_strictly_after_now() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let next = next_retry_at(1, &config, now);
        assert!(next > now);
    }
}
