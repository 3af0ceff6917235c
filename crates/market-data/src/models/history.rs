use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::request::{HistoryRange, Interval};

/// One OHLCV bar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    pub close: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

/// Historical prices for one symbol, ordered by timestamp ascending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub range: HistoryRange,
    pub interval: Interval,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub bars: Vec<PriceBar>,
    pub source: String,
}
