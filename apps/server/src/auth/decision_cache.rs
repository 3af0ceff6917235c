//! Short-lived memory of tokens that were already allowed.
//!
//! Entries are keyed by the SHA-256 of the token so raw tokens never sit in
//! memory longer than the request. Only allowed decisions are stored, and an
//! entry never outlives the token's own `exp`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use financemcp_market_data::{Clock, SystemClock};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};

use super::claims::TokenClaims;

pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

type TokenDigest = [u8; 32];

#[derive(Clone)]
struct CachedDecision {
    claims: TokenClaims,
    expires_at: Instant,
    lifetime: Duration,
}

/// Evicts each decision once its own lifetime has passed.
struct DecisionExpiry;

impl Expiry<TokenDigest, CachedDecision> for DecisionExpiry {
    fn expire_after_create(
        &self,
        _key: &TokenDigest,
        value: &CachedDecision,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.lifetime)
    }

    fn expire_after_update(
        &self,
        _key: &TokenDigest,
        value: &CachedDecision,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.lifetime)
    }
}

pub struct DecisionCache {
    entries: Cache<TokenDigest, CachedDecision>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl DecisionCache {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Self::build_store(DEFAULT_MAX_ENTRIES),
            window,
            clock,
        }
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.entries = Self::build_store(max_entries.max(1));
        self
    }

    fn build_store(max_entries: u64) -> Cache<TokenDigest, CachedDecision> {
        Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(DecisionExpiry)
            .build()
    }

    fn digest(token: &str) -> TokenDigest {
        Sha256::digest(token.as_bytes()).into()
    }

    pub fn get(&self, token: &str) -> Option<TokenClaims> {
        let key = Self::digest(token);
        let entry = self.entries.get(&key)?;
        if entry.expires_at > self.clock.now() {
            Some(entry.claims)
        } else {
            self.entries.invalidate(&key);
            None
        }
    }

    /// Remember an allowed token until `min(now + window, exp)`.
    ///
    /// `unix_now` is the wall-clock time the `exp` claim is compared against.
    /// Tokens without `exp`, or already past it, are not stored.
    pub fn insert(&self, token: &str, claims: TokenClaims, unix_now: i64) {
        let Some(exp) = claims.exp else {
            return;
        };
        let remaining = Duration::from_secs(u64::try_from(exp.saturating_sub(unix_now)).unwrap_or(0));
        let lifetime = remaining.min(self.window);
        if lifetime.is_zero() {
            return;
        }

        self.entries.insert(
            Self::digest(token),
            CachedDecision {
                claims,
                expires_at: self.clock.now() + lifetime,
                lifetime,
            },
        );
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<Arc<TokenDigest>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_ref());
        }
        self.entries.run_pending_tasks();
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
