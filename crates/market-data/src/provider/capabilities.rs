//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a market data provider
//! can do and how it should be rate-limited.

use crate::models::DataCategory;

/// Describes the capabilities of a market data provider.
///
/// Used by the orchestrator to decide which providers are eligible for a
/// request before any network call is made.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Request categories this provider can serve.
    pub operations: &'static [DataCategory],
}

impl ProviderCapabilities {
    pub fn supports(&self, category: DataCategory) -> bool {
        self.operations.contains(&category)
    }
}

/// Rate limiting configuration for a provider.
///
/// Controls how aggressively we can call a provider to avoid
/// hitting their rate limits and getting blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Tokens available for an initial burst.
    pub burst_capacity: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports() {
        let caps = ProviderCapabilities {
            operations: &[DataCategory::Quote, DataCategory::Search],
        };
        assert!(caps.supports(DataCategory::Quote));
        assert!(!caps.supports(DataCategory::Macro));
    }
}
