use serde::{Deserialize, Serialize};

/// Company fundamentals from market data providers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Exchange-qualified symbol as requested
    pub symbol: String,

    /// Provider that supplied the data (e.g., "ALPHA_VANTAGE")
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Business sector (e.g., "Energy")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,

    /// Industry within sector (e.g., "Oil & Gas Refining & Marketing")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    /// Trailing price-to-earnings ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_pe: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub peg_ratio: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_to_book: Option<f64>,

    /// Dividend yield (as decimal, e.g., 0.025 for 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_on_equity: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_ttm: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<f64>,
}
