//! Token bucket rate limiter for market data providers.
//!
//! Implements per-provider rate limiting using the token bucket algorithm.
//! Each provider gets its own bucket with configurable capacity and refill rate.
//! [`RateLimiter::acquire`] never waits: it hands out a [`Permit`] or fails with
//! [`MarketDataError::RateLimited`] and leaves the waiting policy to the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::MarketDataError;
use crate::models::ProviderId;
use crate::provider::RateLimit;

/// Default rate limit: 60 requests per minute.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: u32 = 10;

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens. Always within `0..=capacity`.
    tokens: f64,
    /// Last time the bucket was refilled.
    last_refill: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    fn with_config(config: &RateLimitConfig, now: Instant) -> Self {
        let capacity = f64::from(config.burst_capacity.max(1));
        Self {
            tokens: capacity,
            last_refill: now,
            rate: f64::from(config.requests_per_minute.max(1)) / 60.0,
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take `cost` tokens if available. A cost above capacity is charged as
    /// the full bucket.
    fn try_take(&mut self, now: Instant, cost: f64) -> bool {
        self.refill(now);
        let cost = cost.min(self.capacity);

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Wait time until `cost` tokens are available. Call after `refill`.
    fn time_until_available(&self, cost: f64) -> Duration {
        let cost = cost.min(self.capacity);
        if self.tokens >= cost {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((cost - self.tokens) / self.rate)
        }
    }
}

/// Rate limiter configuration for a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
    /// Maximum burst capacity.
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }
}

impl From<RateLimit> for RateLimitConfig {
    fn from(limit: RateLimit) -> Self {
        Self {
            requests_per_minute: limit.requests_per_minute,
            burst_capacity: limit.burst_capacity,
        }
    }
}

/// Proof that tokens were taken from a provider's bucket.
#[must_use = "a permit represents a consumed token; make the provider call"]
#[derive(Debug)]
pub struct Permit {
    provider: ProviderId,
}

impl Permit {
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Thread-safe rate limiter that maintains per-provider token buckets.
/// Buckets are created on-demand with default settings, or can be
/// pre-configured with custom limits.
pub struct RateLimiter {
    /// Per-provider token buckets.
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, RateLimitConfig>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// Every critical section leaves the map consistent, so a panic
    /// elsewhere cannot corrupt it.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider, replacing any bucket
    /// already created for it.
    pub fn configure(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs); // Release configs lock before acquiring buckets lock

        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    /// Configure a provider only if no limits were set for it yet.
    pub fn configure_if_absent(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.entry(provider.to_string()).or_insert(config);
    }

    /// Take one token for the given provider without waiting.
    ///
    /// Fails with [`MarketDataError::RateLimited`] carrying the time until the
    /// next token when the bucket is empty.
    pub fn acquire(&self, provider: &ProviderId) -> Result<Permit, MarketDataError> {
        self.acquire_many(provider, 1)
    }

    /// Take `tokens` tokens at once, for a call that makes several upstream
    /// requests. Nothing is taken unless all of them are available.
    pub fn acquire_many(
        &self,
        provider: &ProviderId,
        tokens: u32,
    ) -> Result<Permit, MarketDataError> {
        let cost = f64::from(tokens.max(1));
        let now = self.clock.now();
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| self.create_bucket(provider, now));

        if bucket.try_take(now, cost) {
            debug!("Rate limiter: acquired {} token(s) for '{}'", cost, provider);
            return Ok(Permit {
                provider: provider.clone(),
            });
        }

        let retry_after = bucket.time_until_available(cost);
        debug!(
            "Rate limiter: '{}' exhausted, next token in {:?}",
            provider, retry_after
        );
        Err(MarketDataError::RateLimited {
            provider: provider.to_string(),
            retry_after: Some(retry_after),
        })
    }

    /// Get the remaining tokens for a provider.
    pub fn remaining_tokens(&self, provider: &ProviderId) -> f64 {
        let now = self.clock.now();
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(provider.as_ref()) {
            bucket.refill(now);
            bucket.tokens
        } else {
            f64::from(self.config_for(provider).burst_capacity)
        }
    }

    /// Reset the rate limiter for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    fn config_for(&self, provider: &ProviderId) -> RateLimitConfig {
        self.lock_configs()
            .get(provider.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// Create a bucket for a provider, using custom config if available.
    fn create_bucket(&self, provider: &ProviderId, now: Instant) -> TokenBucket {
        TokenBucket::with_config(&self.config_for(provider), now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::borrow::Cow;

    fn limiter_with_clock() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_token_bucket_take() {
        let now = Instant::now();
        let mut bucket = TokenBucket::with_config(&RateLimitConfig::default(), now);

        for _ in 0..DEFAULT_BUCKET_CAPACITY {
            assert!(bucket.try_take(now, 1.0));
        }

        assert!(!bucket.try_take(now, 1.0));
        assert!(bucket.tokens >= 0.0);
    }

    #[test]
    fn test_token_bucket_refill_is_capped() {
        let now = Instant::now();
        let config = RateLimitConfig {
            requests_per_minute: 60, // 1 token/second
            burst_capacity: 2,
        };
        let mut bucket = TokenBucket::with_config(&config, now);

        assert!(bucket.try_take(now, 1.0));
        assert!(bucket.try_take(now, 1.0));
        assert!(!bucket.try_take(now, 1.0));

        bucket.refill(now + Duration::from_secs(3600));
        assert_eq!(bucket.tokens, 2.0);
    }

    #[test]
    fn test_capacity_n_allows_exactly_n() {
        let (limiter, _clock) = limiter_with_clock();
        let provider: ProviderId = Cow::Borrowed("YAHOO");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 60,
                burst_capacity: 3,
            },
        );

        for _ in 0..3 {
            assert!(limiter.acquire(&provider).is_ok());
        }

        let err = limiter.acquire(&provider).unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[test]
    fn test_full_refill_interval_restores_capacity_only() {
        let (limiter, clock) = limiter_with_clock();
        let provider: ProviderId = Cow::Borrowed("ALPHA_VANTAGE");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 5,
                burst_capacity: 5,
            },
        );

        for _ in 0..5 {
            limiter.acquire(&provider).unwrap();
        }
        assert!(limiter.acquire(&provider).is_err());

        // One minute refills all five tokens; ten minutes must not exceed capacity.
        clock.advance(Duration::from_secs(600));
        assert_eq!(limiter.remaining_tokens(&provider), 5.0);
        for _ in 0..5 {
            assert!(limiter.acquire(&provider).is_ok());
        }
        assert!(limiter.acquire(&provider).is_err());
    }

    #[test]
    fn test_rate_limited_reports_retry_after() {
        let (limiter, _clock) = limiter_with_clock();
        let provider: ProviderId = Cow::Borrowed("FRED");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 60,
                burst_capacity: 1,
            },
        );

        limiter.acquire(&provider).unwrap();
        match limiter.acquire(&provider) {
            Err(MarketDataError::RateLimited { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(1)));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limiter_default_config() {
        let limiter = RateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("TEST_PROVIDER");

        for _ in 0..DEFAULT_BUCKET_CAPACITY {
            assert!(limiter.acquire(&provider).is_ok());
        }
        assert!(limiter.acquire(&provider).is_err());
    }

    #[test]
    fn test_configure_if_absent_keeps_existing() {
        let limiter = RateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("YAHOO");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 30,
                burst_capacity: 2,
            },
        );
        limiter.configure_if_absent(&provider, RateLimitConfig::default());

        assert_eq!(limiter.remaining_tokens(&provider), 2.0);
    }

    #[test]
    fn test_rate_limiter_per_provider_isolation() {
        let limiter = RateLimiter::new();
        let provider_a: ProviderId = Cow::Borrowed("PROVIDER_A");
        let provider_b: ProviderId = Cow::Borrowed("PROVIDER_B");

        for _ in 0..DEFAULT_BUCKET_CAPACITY {
            let _ = limiter.acquire(&provider_a);
        }
        assert!(limiter.acquire(&provider_a).is_err());
        assert!(limiter.acquire(&provider_b).is_ok());
    }

    #[test]
    fn test_acquire_many_is_all_or_nothing() {
        let (limiter, clock) = limiter_with_clock();
        let provider: ProviderId = Cow::Borrowed("FRED");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 60,
                burst_capacity: 3,
            },
        );

        limiter.acquire_many(&provider, 2).unwrap();
        match limiter.acquire_many(&provider, 2) {
            Err(MarketDataError::RateLimited { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(1)));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
        assert_eq!(limiter.remaining_tokens(&provider), 1.0);

        clock.advance(Duration::from_secs(1));
        assert!(limiter.acquire_many(&provider, 2).is_ok());
    }

    #[test]
    fn test_rate_limiter_reset() {
        let limiter = RateLimiter::new();
        let provider: ProviderId = Cow::Borrowed("RESET_PROVIDER");

        for _ in 0..DEFAULT_BUCKET_CAPACITY {
            let _ = limiter.acquire(&provider);
        }
        assert!(limiter.acquire(&provider).is_err());

        limiter.reset(&provider);
        assert!(limiter.acquire(&provider).is_ok());
    }

    #[test]
    fn test_concurrent_acquire_never_overdraws() {
        let limiter = Arc::new(RateLimiter::with_clock(Arc::new(ManualClock::new())));
        let provider: ProviderId = Cow::Borrowed("SHARED");
        limiter.configure(
            &provider,
            RateLimitConfig {
                requests_per_minute: 60,
                burst_capacity: 20,
            },
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let provider = provider.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.acquire(&provider).is_ok())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 20);
    }
}
