//! Symbol resolution for Indian equities.
//!
//! Users type bare tickers ("RELIANCE") far more often than qualified ones
//! ("RELIANCE.NS"). The resolver turns either form into a resolution plan:
//!
//! ```text
//!   "RELIANCE"  ──►  [ RELIANCE.NS (rank 0), RELIANCE.BO (rank 1) ]
//!   "TCS.BO"    ──►  [ TCS.BO (rank 0) ]
//! ```
//!
//! Candidates always carry the Yahoo-style suffix. Providers that spell
//! exchanges differently translate in
//! [`MarketDataProvider::provider_symbol`](crate::provider::MarketDataProvider::provider_symbol).

mod exchange;
mod symbol_resolver;

pub use exchange::Exchange;
pub use symbol_resolver::{SymbolCandidate, SymbolResolver};
