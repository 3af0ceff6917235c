//! Bare ticker to ordered exchange candidates.

use serde::{Deserialize, Serialize};

use super::exchange::Exchange;
use crate::errors::MarketDataError;
use crate::models::SearchResult;

/// Longest accepted user symbol, suffix included.
const MAX_SYMBOL_LEN: usize = 32;

/// One exchange-qualified symbol to try, e.g. `RELIANCE.NS`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCandidate {
    /// Canonical qualified symbol (Yahoo suffix).
    pub symbol: String,
    /// Ticker without suffix.
    pub base: String,
    pub exchange: Exchange,
    /// 0 is tried first.
    pub rank: usize,
}

impl SymbolCandidate {
    pub fn new(base: &str, exchange: Exchange, rank: usize) -> Self {
        Self {
            symbol: format!("{}{}", base, exchange.suffix()),
            base: base.to_string(),
            exchange,
            rank,
        }
    }
}

/// Expands user symbols into resolution plans.
///
/// Pure and synchronous: no I/O, same input always yields the same plan.
#[derive(Clone, Debug)]
pub struct SymbolResolver {
    primary: Exchange,
    secondary: Exchange,
}

impl SymbolResolver {
    pub fn new(primary: Exchange, secondary: Exchange) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> Exchange {
        self.primary
    }

    pub fn secondary(&self) -> Exchange {
        self.secondary
    }

    /// Produce the ordered candidate list for a user symbol.
    ///
    /// A recognized exchange suffix yields exactly that candidate. A bare
    /// ticker yields the primary exchange first, then the secondary.
    pub fn resolve_plan(&self, input: &str) -> Result<Vec<SymbolCandidate>, MarketDataError> {
        let symbol = input.trim().to_ascii_uppercase();

        if symbol.is_empty() {
            return Err(MarketDataError::InvalidInput(
                "Symbol must not be empty".to_string(),
            ));
        }
        if symbol.len() > MAX_SYMBOL_LEN {
            return Err(MarketDataError::InvalidInput(format!(
                "Symbol longer than {} characters",
                MAX_SYMBOL_LEN
            )));
        }
        if let Some(bad) = symbol.chars().find(|c| !is_symbol_char(*c)) {
            return Err(MarketDataError::InvalidInput(format!(
                "Symbol contains illegal character '{}'",
                bad
            )));
        }

        if let Some((base, suffix)) = symbol.rsplit_once('.') {
            if let Some(exchange) = Exchange::from_suffix(suffix) {
                if base.is_empty() {
                    return Err(MarketDataError::InvalidInput(
                        "Symbol has a suffix but no ticker".to_string(),
                    ));
                }
                return Ok(vec![SymbolCandidate::new(base, exchange, 0)]);
            }
        }

        let mut plan = vec![SymbolCandidate::new(&symbol, self.primary, 0)];
        if self.secondary != self.primary {
            plan.push(SymbolCandidate::new(&symbol, self.secondary, 1));
        }
        Ok(plan)
    }

    /// Order search results: primary exchange listings, then secondary,
    /// then everything else. Order within each group is preserved.
    pub fn prioritize(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        results.sort_by_key(|result| self.group_of(result));
        results
    }

    fn group_of(&self, result: &SearchResult) -> u8 {
        let exchange = result
            .symbol
            .rsplit_once('.')
            .and_then(|(_, suffix)| Exchange::from_suffix(suffix))
            .or_else(|| Exchange::from_label(&result.exchange));

        match exchange {
            Some(e) if e == self.primary => 0,
            Some(e) if e == self.secondary => 1,
            _ => 2,
        }
    }
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new(Exchange::Nse, Exchange::Bse)
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '&' | '-' | '_' | '.' | '^')
}
