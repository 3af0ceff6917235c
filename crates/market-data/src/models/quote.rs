use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest market quote for a single exchange-qualified symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Exchange-qualified symbol as requested (e.g., "RELIANCE.NS")
    pub symbol: String,

    /// Company name, when the provider reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Exchange name (e.g., "NSE")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,

    /// Quote currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Current/last traded price (required)
    pub price: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_low: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifty_two_week_high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifty_two_week_low: Option<Decimal>,

    /// Time of the last trade
    pub timestamp: DateTime<Utc>,

    /// Source of the quote (YAHOO, ALPHA_VANTAGE)
    pub source: String,
}

impl Quote {
    /// Create a new quote with minimal required fields
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            exchange: None,
            currency: None,
            price,
            open: None,
            day_high: None,
            day_low: None,
            previous_close: None,
            volume: None,
            market_cap: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            timestamp,
            source: source.into(),
        }
    }

    /// Absolute change against the previous close, falling back to the open.
    pub fn change(&self) -> Option<Decimal> {
        self.reference_price().map(|base| self.price - base)
    }

    /// Percentage change against the same reference as [`Quote::change`].
    pub fn change_percent(&self) -> Option<Decimal> {
        let base = self.reference_price()?;
        if base.is_zero() {
            return None;
        }
        Some(((self.price - base) / base * Decimal::ONE_HUNDRED).round_dp(4))
    }

    fn reference_price(&self) -> Option<Decimal> {
        self.previous_close.or(self.open)
    }
}
