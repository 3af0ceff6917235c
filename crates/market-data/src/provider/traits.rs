//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{
    EconomicSeries, Fundamentals, HistoryRange, Interval, Payload, PriceHistory, ProviderRequest,
    Quote, SearchResult, SeriesQuery,
};
use crate::resolver::SymbolCandidate;

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source.
/// The orchestrator uses the provider's capabilities and priority to decide
/// when and how to call it. Every operation has a default that returns
/// [`MarketDataError::NotSupported`], so a provider only overrides what its
/// upstream actually offers.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use financemcp_market_data::models::{DataCategory, Quote};
/// use financemcp_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities { operations: &[DataCategory::Quote] }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::default()
///     }
///
///     async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "YAHOO", "ALPHA_VANTAGE", etc.
    /// Used for logging, rate limiting and diagnostics.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Rate limits to seed the shared limiter with.
    fn rate_limit(&self) -> RateLimit;

    /// Upstream HTTP calls `request` will make, charged against the
    /// provider's rate limit before the call.
    fn request_cost(&self, request: &ProviderRequest) -> u32 {
        let _ = request;
        1
    }

    /// Translate a resolution candidate into this provider's symbol.
    ///
    /// `None` means the provider cannot address the candidate's exchange,
    /// and the orchestrator skips it without making a call.
    fn provider_symbol(&self, candidate: &SymbolCandidate) -> Option<String> {
        Some(candidate.symbol.clone())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let _ = symbol;
        Err(MarketDataError::not_supported(self.id(), "quote"))
    }

    /// Fetch historical bars. Bars are ordered by timestamp ascending.
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<PriceHistory, MarketDataError> {
        let _ = (symbol, range, interval);
        Err(MarketDataError::not_supported(self.id(), "history"))
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let _ = symbol;
        Err(MarketDataError::not_supported(self.id(), "fundamentals"))
    }

    /// Search for symbols matching the query.
    ///
    /// An empty result list is a valid answer, not an error.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MarketDataError> {
        let _ = (query, limit);
        Err(MarketDataError::not_supported(self.id(), "search"))
    }

    async fn get_series(&self, query: &SeriesQuery) -> Result<EconomicSeries, MarketDataError> {
        let _ = query;
        Err(MarketDataError::not_supported(self.id(), "series"))
    }

    /// Dispatch a resolved request to the matching operation.
    async fn fetch(&self, request: &ProviderRequest) -> Result<Payload, MarketDataError> {
        match request {
            ProviderRequest::Quote { symbol } => self.get_quote(symbol).await.map(Payload::Quote),
            ProviderRequest::History {
                symbol,
                range,
                interval,
            } => self
                .get_history(symbol, *range, *interval)
                .await
                .map(Payload::History),
            ProviderRequest::Fundamentals { symbol } => self
                .get_fundamentals(symbol)
                .await
                .map(Payload::Fundamentals),
            ProviderRequest::Search { query, limit } => {
                self.search(query, *limit).await.map(Payload::Search)
            }
            ProviderRequest::Series(query) => self.get_series(query).await.map(Payload::Series),
        }
    }
}
