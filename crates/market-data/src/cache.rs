//! In-memory result cache with per-category TTL.
//!
//! Entries are keyed by a normalized request signature ([`CacheKey`]) and
//! carry their own TTL, chosen from [`CacheTtls`] by the category of the
//! payload. An expired entry is never returned: reads treat it as absent and
//! drop it, and [`ResultCache::purge_expired`] clears the rest in bulk. The
//! store is bounded, so a stream of distinct keys evicts the least recently
//! used entries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;

use crate::clock::{Clock, SystemClock};
use crate::models::{DataCategory, Payload};

/// Default TTL applied when a category has no override (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default TTL for macro-economic series (1 hour).
pub const DEFAULT_MACRO_TTL: Duration = Duration::from_secs(3600);

/// Parameters whose values are ticker symbols.
const SYMBOL_PARAMS: &[&str] = &["symbol", "series_id"];

/// Parameters whose values are free text.
const TEXT_PARAMS: &[&str] = &["query"];

// ============================================================================
// Keys
// ============================================================================

/// Normalized request signature: `tool?k1=v1&k2=v2` with parameters sorted.
///
/// Symbol parameters are trimmed and upper-cased and free-text queries are
/// trimmed and lower-cased, so `reliance` and ` RELIANCE ` share one entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<'a, I>(tool: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let sorted: BTreeMap<&str, String> = params
            .into_iter()
            .map(|(name, value)| (name, normalize_param(name, &value)))
            .collect();

        let mut key = tool.to_string();
        for (i, (name, value)) in sorted.iter().enumerate() {
            key.push(if i == 0 { '?' } else { '&' });
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_param(name: &str, value: &str) -> String {
    let value = value.trim();
    if SYMBOL_PARAMS.contains(&name) {
        value.to_ascii_uppercase()
    } else if TEXT_PARAMS.contains(&name) {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

// ============================================================================
// TTL policy
// ============================================================================

/// TTL per data category.
#[derive(Clone, Debug)]
pub struct CacheTtls {
    pub default: Duration,
    pub overrides: HashMap<DataCategory, Duration>,
}

impl CacheTtls {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            default: ttl,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, category: DataCategory, ttl: Duration) -> Self {
        self.overrides.insert(category, ttl);
        self
    }

    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        self.overrides.get(&category).copied().unwrap_or(self.default)
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::uniform(DEFAULT_TTL)
            .with_override(DataCategory::Quote, DEFAULT_TTL)
            .with_override(DataCategory::Macro, DEFAULT_MACRO_TTL)
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Default bound on the number of stored results.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone, Debug)]
struct CacheEntry {
    payload: Payload,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Evicts each entry after its own TTL, restarted on overwrite.
struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-wide store of successful provider results.
///
/// Backed by a bounded `moka` cache that evicts on TTL and capacity. Reads
/// also check freshness against the injected [`Clock`], so an entry is
/// never served past its TTL as that clock sees it.
pub struct ResultCache {
    entries: Cache<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::bounded(DEFAULT_MAX_ENTRIES, clock)
    }

    pub fn bounded(max_entries: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries.max(1))
                .eviction_policy(EvictionPolicy::lru())
                .expire_after(EntryExpiry)
                .build(),
            clock,
        }
    }

    /// Returns the payload stored under `key` if it has not expired.
    pub fn get(&self, key: &CacheKey) -> Option<Payload> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(self.clock.now()) {
            debug!("Cache hit for {}", key);
            Some(entry.payload)
        } else {
            debug!("Cache entry expired for {}", key);
            self.entries.invalidate(key);
            None
        }
    }

    /// Stores `payload` under `key`, replacing any previous entry and
    /// restarting its TTL.
    pub fn put(&self, key: CacheKey, payload: Payload, ttl: Duration) {
        let stored_at = self.clock.now();
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at,
                ttl,
            },
        );
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<Arc<CacheKey>> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.entries.invalidate(key.as_ref());
        }
        self.entries.run_pending_tasks();
        stale.len()
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Quote;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote_payload(price: rust_decimal::Decimal) -> Payload {
        Payload::Quote(Quote::new("RELIANCE.NS", price, Utc::now(), "YAHOO"))
    }

    fn quote_key(symbol: &str) -> CacheKey {
        CacheKey::new("stock_quote", [("symbol", symbol.to_string())])
    }

    #[test]
    fn test_key_normalizes_symbols_and_queries() {
        assert_eq!(quote_key(" reliance "), quote_key("RELIANCE"));
        assert_eq!(quote_key("reliance").as_str(), "stock_quote?symbol=RELIANCE");

        let a = CacheKey::new("search", [("query", "Tata Motors".to_string())]);
        let b = CacheKey::new("search", [("query", "tata motors ".to_string())]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_sorts_params() {
        let a = CacheKey::new(
            "stock_history",
            [
                ("symbol", "TCS".to_string()),
                ("interval", "1d".to_string()),
                ("period", "1mo".to_string()),
            ],
        );
        let b = CacheKey::new(
            "stock_history",
            [
                ("period", "1mo".to_string()),
                ("symbol", "tcs".to_string()),
                ("interval", "1d".to_string()),
            ],
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "stock_history?interval=1d&period=1mo&symbol=TCS");
    }

    #[test]
    fn test_get_returns_stored_payload_until_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResultCache::with_clock(clock.clone());
        let key = quote_key("RELIANCE");

        cache.put(key.clone(), quote_payload(dec!(2450)), Duration::from_secs(300));
        assert_eq!(cache.get(&key), Some(quote_payload(dec!(2450))));
        assert_eq!(cache.get(&key), cache.get(&key));

        clock.advance(Duration::from_secs(299));
        assert!(cache.get(&key).is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites_and_resets_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResultCache::with_clock(clock.clone());
        let key = quote_key("TCS");

        cache.put(key.clone(), quote_payload(dec!(100)), Duration::from_secs(60));
        clock.advance(Duration::from_secs(50));
        cache.put(key.clone(), quote_payload(dec!(101)), Duration::from_secs(60));
        clock.advance(Duration::from_secs(50));

        assert_eq!(cache.get(&key), Some(quote_payload(dec!(101))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResultCache::with_clock(clock.clone());

        cache.put(quote_key("A"), quote_payload(dec!(1)), Duration::from_secs(10));
        cache.put(quote_key("B"), quote_payload(dec!(2)), Duration::from_secs(100));
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&quote_key("B")).is_some());
    }

    #[test]
    fn test_capacity_is_bounded() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResultCache::bounded(2, clock.clone());

        for symbol in ["A", "B", "C", "D"] {
            cache.put(quote_key(symbol), quote_payload(dec!(1)), Duration::from_secs(300));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&quote_key("D")).is_some());
    }

    #[test]
    fn test_ttls_per_category() {
        let ttls = CacheTtls::default().with_override(DataCategory::History, Duration::from_secs(900));
        assert_eq!(ttls.ttl_for(DataCategory::Quote), DEFAULT_TTL);
        assert_eq!(ttls.ttl_for(DataCategory::Macro), DEFAULT_MACRO_TTL);
        assert_eq!(ttls.ttl_for(DataCategory::History), Duration::from_secs(900));
        assert_eq!(ttls.ttl_for(DataCategory::Search), DEFAULT_TTL);
    }
}
