//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and rate limiting configuration
//! - Concrete provider implementations (Yahoo, Alpha Vantage, FRED)
//!
//! # Architecture
//!
//! Providers are stateless from the orchestrator's point of view: they take
//! a fully resolved [`ProviderRequest`](crate::models::ProviderRequest) and
//! return a [`Payload`](crate::models::Payload) or a classified
//! [`MarketDataError`](crate::errors::MarketDataError). Rate limiting,
//! retries and caching all live in the orchestrator.

mod capabilities;
pub(crate) mod http;
mod traits;

pub mod alpha_vantage;
pub mod fred;
pub mod yahoo;

// Re-exports
pub use capabilities::{ProviderCapabilities, RateLimit};
pub use http::DEFAULT_TIMEOUT;
pub use traits::MarketDataProvider;
