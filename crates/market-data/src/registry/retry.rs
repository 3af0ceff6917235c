//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Retry budget and backoff curve for one (candidate, provider) pair.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total calls allowed per pair, first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Relative jitter: the delay is scaled by a factor in `[1 - j, 1 + j]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10_000),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy with no jitter, for deterministic schedules.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before retry number `attempt` (1 = delay after the first call):
    /// `min(base * multiplier^(attempt-1), max_delay)`, then jittered.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nominal = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = nominal.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rng.gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    /// `delay_for` with the thread-local RNG.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
            jitter: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(7);

        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n, &mut rng)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(5000),
                Duration::from_millis(5000),
            ]
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let delay = policy.delay_for(2, &mut rng);
            assert!(delay >= Duration::from_millis(1600), "{:?}", delay);
            assert!(delay <= Duration::from_millis(2400), "{:?}", delay);
        }
    }
}
