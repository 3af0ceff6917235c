//! FinanceMCP Market Data Crate
//!
//! This crate provides provider-agnostic retrieval of equity and
//! macro-economic data for the FinanceMCP server.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Indian equities on NSE and BSE, addressed with or without a suffix
//! - Multiple providers: Yahoo Finance, Alpha Vantage, FRED
//! - Per-provider token-bucket rate limiting
//! - Retry with jittered exponential backoff
//! - A TTL result cache keyed by normalized request signature
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |   Tool handler   | --> |   ResultCache    |  (hit: done)
//! +------------------+     +------------------+
//!                                  | miss
//!                                  v
//!                          +------------------+
//!                          |  SymbolResolver  |  (RELIANCE -> .NS, .BO)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   RateLimiter    |  (token per provider)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    Provider      |  (Yahoo, AlphaVantage, FRED)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |     Payload      |  (written back to the cache)
//!                          +------------------+
//! ```
//!
//! [`RetrievalOrchestrator`] drives the whole flow and records every
//! provider call in [`FetchDiagnostics`].
//!
//! # Core Types
//!
//! - [`StockRequest`] / [`SeriesQuery`] - What a caller asks for
//! - [`SymbolCandidate`] - One exchange-qualified symbol to try
//! - [`Payload`] - Any successful result (quote, history, fundamentals, search, series)
//! - [`MarketDataError`] - Classified failure, see [`RetryClass`]

pub mod cache;
pub mod clock;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;

// Re-export all public types from models
pub use models::{
    DataCategory, EconomicSeries, EquityQuery, Fundamentals, HistoryRange, Interval,
    Observation, Payload, PriceBar, PriceHistory, ProviderId, ProviderRequest, Quote,
    SearchResult, SeriesQuery, StockRequest,
};

pub use cache::{CacheKey, CacheTtls, ResultCache};
pub use clock::{Clock, ManualClock, Sleeper, SystemClock, TokioSleeper};
pub use errors::{MarketDataError, RetryClass};

// Re-export resolver types
pub use resolver::{Exchange, SymbolCandidate, SymbolResolver};

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::fred::FredProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

// Re-export registry types
pub use registry::{
    AttemptOutcome, FetchAttempt, FetchDiagnostics, RateLimitConfig, RateLimiter,
    RetrievalOrchestrator, RetryPolicy,
};
