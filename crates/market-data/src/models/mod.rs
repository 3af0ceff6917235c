//! Market data models
//!
//! This module contains the core data types for market data operations:
//! - `types` - Type aliases for common identifiers (ProviderId)
//! - `request` - Request descriptions (StockRequest, SeriesQuery, ProviderRequest)
//! - `quote`, `history`, `fundamentals`, `search`, `series` - Result data
//! - `payload` - The cacheable sum of all result kinds (Payload)

mod fundamentals;
mod history;
mod payload;
mod quote;
mod request;
mod search;
mod series;
mod types;

pub use fundamentals::Fundamentals;
pub use history::{PriceBar, PriceHistory};
pub use payload::Payload;
pub use quote::Quote;
pub use request::{
    DataCategory, EquityQuery, HistoryRange, Interval, ProviderRequest, SeriesQuery, StockRequest,
};
pub use search::SearchResult;
pub use series::{EconomicSeries, Observation};
pub use types::ProviderId;
