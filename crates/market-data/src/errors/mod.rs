//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

use crate::registry::FetchDiagnostics;

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines how the orchestrator should handle the error.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The caller supplied an unusable symbol or parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested symbol was not found by the provider.
    /// Terminal for this (candidate, provider) pair only.
    #[error("Symbol not found: {symbol} ({provider})")]
    SymbolNotFound {
        provider: String,
        symbol: String,
    },

    /// The local rate limiter or the provider itself (HTTP 429) refused the call.
    #[error("Rate limited: {provider}")]
    RateLimited {
        provider: String,
        /// Time until the local bucket holds a token again, when known.
        retry_after: Option<Duration>,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// Retryable provider failure: 5xx, connection error, malformed payload.
    #[error("Transient error: {provider} - {cause}")]
    Transient { provider: String, cause: String },

    /// Non-retryable provider failure: bad API key, rejected request.
    #[error("Fatal error: {provider} - {cause}")]
    Fatal { provider: String, cause: String },

    /// The provider does not implement this operation or cannot address
    /// this exchange.
    #[error("Operation not supported: {operation} ({provider})")]
    NotSupported { operation: String, provider: String },

    /// No provider is registered for this kind of request.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// Every candidate on every provider was tried without success.
    #[error("No data available: {}", .diagnostics.summary())]
    NoDataAvailable { diagnostics: FetchDiagnostics },
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use financemcp_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::Timeout { provider: "YAHOO".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::Fatal {
    ///     provider: "FRED".to_string(),
    ///     cause: "invalid api_key".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Fatal { .. } | Self::InvalidInput(_) => RetryClass::Never,

            Self::Timeout { .. } | Self::Transient { .. } => RetryClass::WithBackoff,

            Self::RateLimited { .. } => RetryClass::Throttled,

            Self::SymbolNotFound { .. } => RetryClass::NextCandidate,

            Self::NotSupported { .. } => RetryClass::Skip,

            // Aggregate outcomes never come back from a single provider call
            Self::NoProvidersAvailable | Self::NoDataAvailable { .. } => RetryClass::Never,
        }
    }

    /// Provider named by the error, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::SymbolNotFound { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider }
            | Self::Transient { provider, .. }
            | Self::Fatal { provider, .. }
            | Self::NotSupported { provider, .. } => Some(provider),
            Self::InvalidInput(_) | Self::NoProvidersAvailable | Self::NoDataAvailable { .. } => {
                None
            }
        }
    }

    pub(crate) fn not_found(provider: &str, symbol: &str) -> Self {
        Self::SymbolNotFound {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
        }
    }

    pub(crate) fn transient(provider: &str, cause: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.to_string(),
            cause: cause.into(),
        }
    }

    pub(crate) fn fatal(provider: &str, cause: impl Into<String>) -> Self {
        Self::Fatal {
            provider: provider.to_string(),
            cause: cause.into(),
        }
    }

    pub(crate) fn not_supported(provider: &str, operation: &str) -> Self {
        Self::NotSupported {
            operation: operation.to_string(),
            provider: provider.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_not_found_moves_to_next_candidate() {
        let error = MarketDataError::not_found("YAHOO", "RELIANCE.NS");
        assert_eq!(error.retry_class(), RetryClass::NextCandidate);
    }

    #[test]
    fn test_timeout_retries_with_backoff() {
        let error = MarketDataError::Timeout {
            provider: "ALPHA_VANTAGE".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_transient_retries_with_backoff() {
        let error = MarketDataError::transient("YAHOO", "HTTP 503");
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_rate_limited_is_throttled() {
        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
            retry_after: None,
        };
        assert_eq!(error.retry_class(), RetryClass::Throttled);
    }

    #[test]
    fn test_fatal_never_retries() {
        let error = MarketDataError::fatal("FRED", "Bad API key");
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_invalid_input_never_retries() {
        let error = MarketDataError::InvalidInput("empty symbol".to_string());
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_not_supported_is_skipped() {
        let error = MarketDataError::not_supported("YAHOO", "fundamentals");
        assert_eq!(error.retry_class(), RetryClass::Skip);
    }

    #[test]
    fn test_provider_accessor() {
        assert_eq!(
            MarketDataError::transient("FRED", "reset").provider(),
            Some("FRED")
        );
        assert_eq!(MarketDataError::NoProvidersAvailable.provider(), None);
    }

    #[test]
    fn test_no_data_available_display_lists_attempts() {
        let mut diagnostics = FetchDiagnostics::new();
        diagnostics.record_not_found("RELIANCE.NS", "YAHOO", 1);
        let error = MarketDataError::NoDataAvailable { diagnostics };
        assert!(error.to_string().contains("RELIANCE.NS@YAHOO#1: NOT_FOUND"));
    }
}
