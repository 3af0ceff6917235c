//! Yahoo Finance API response models.
//!
//! Three endpoints are used: `v8/finance/chart` for prices and bars,
//! `v1/finance/search` for symbol lookup and `v10/finance/quoteSummary`
//! for fundamentals.

use serde::Deserialize;

// ============================================================================
// Chart API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    #[serde(default)]
    pub result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    pub error: Option<YahooApiError>,
}

/// Error object embedded in chart and quoteSummary responses.
#[derive(Debug, Deserialize)]
pub struct YahooApiError {
    pub code: Option<String>,
    pub description: Option<String>,
}

impl YahooApiError {
    pub fn is_not_found(&self) -> bool {
        let code = self.code.as_deref().unwrap_or_default();
        let description = self.description.as_deref().unwrap_or_default();
        code.eq_ignore_ascii_case("Not Found")
            || description.contains("No data found")
            || description.contains("delisted")
    }

    pub fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(desc)) => format!("{}: {}", code, desc),
            (Some(code), None) => code.clone(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct YahooChartResult {
    pub meta: YahooChartMeta,
    #[serde(default)]
    pub timestamp: Option<Vec<i64>>,
    #[serde(default)]
    pub indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartMeta {
    pub symbol: String,
    pub currency: Option<String>,
    pub exchange_name: Option<String>,
    pub full_exchange_name: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub regular_market_price: Option<f64>,
    pub regular_market_time: Option<i64>,
    pub regular_market_day_high: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_volume: Option<u64>,
    pub chart_previous_close: Option<f64>,
    pub previous_close: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooBarColumns>,
}

/// Columnar OHLCV arrays, aligned with `timestamp`. Gaps are `null`.
#[derive(Debug, Default, Deserialize)]
pub struct YahooBarColumns {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<u64>>,
}

// ============================================================================
// Search API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooSearchResponse {
    #[serde(default)]
    pub quotes: Vec<YahooSearchQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSearchQuote {
    pub symbol: Option<String>,
    pub shortname: Option<String>,
    pub longname: Option<String>,
    pub exchange: Option<String>,
    pub exch_disp: Option<String>,
    pub quote_type: Option<String>,
    pub score: Option<f64>,
}

// ============================================================================
// quoteSummary API
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResponse {
    pub quote_summary: YahooQuoteSummary,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteSummary {
    #[serde(default)]
    pub result: Option<Vec<YahooQuoteSummaryResult>>,
    #[serde(default)]
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResult {
    pub price: Option<YahooPriceData>,
    pub summary_profile: Option<YahooSummaryProfile>,
    pub summary_detail: Option<YahooSummaryDetail>,
    pub default_key_statistics: Option<YahooKeyStatistics>,
    pub financial_data: Option<YahooFinancialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooPriceData {
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

/// Numeric field as `{"raw": 1.5, "fmt": "1.50"}`. Yahoo sends `{}` when
/// there is no value.
#[derive(Debug, Deserialize, Clone)]
pub struct YahooValue {
    pub raw: Option<f64>,
}

pub fn raw(value: &Option<YahooValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSummaryProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub long_business_summary: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSummaryDetail {
    pub market_cap: Option<YahooValue>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<YahooValue>,
    #[serde(rename = "forwardPE")]
    pub forward_pe: Option<YahooValue>,
    pub dividend_yield: Option<YahooValue>,
    pub beta: Option<YahooValue>,
    pub fifty_two_week_high: Option<YahooValue>,
    pub fifty_two_week_low: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooKeyStatistics {
    pub peg_ratio: Option<YahooValue>,
    pub price_to_book: Option<YahooValue>,
    pub trailing_eps: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooFinancialData {
    pub profit_margins: Option<YahooValue>,
    pub return_on_equity: Option<YahooValue>,
    pub total_revenue: Option<YahooValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_chart_with_gaps() {
        let json = r#"{"chart":{"result":[{
            "meta":{"symbol":"TCS.NS","currency":"INR","regularMarketPrice":3890.5},
            "timestamp":[1704096000,1704182400],
            "indicators":{"quote":[{"open":[3800.0,null],"high":[3900.0,null],
                "low":[3790.0,null],"close":[3890.5,null],"volume":[120000,null]}]}
        }],"error":null}}"#;
        let response: YahooChartResponse = serde_json::from_str(json).unwrap();
        let result = &response.chart.result.unwrap()[0];
        assert_eq!(result.meta.symbol, "TCS.NS");
        let bars = &result.indicators.as_ref().unwrap().quote[0];
        assert_eq!(bars.close, vec![Some(3890.5), None]);
    }

    #[test]
    fn test_deserialize_chart_error() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found",
            "description":"No data found, symbol may be delisted"}}}"#;
        let response: YahooChartResponse = serde_json::from_str(json).unwrap();
        assert!(response.chart.error.unwrap().is_not_found());
    }

    #[test]
    fn test_deserialize_summary_detail_empty_objects() {
        let json = r#"{
            "marketCap": {"raw": 1000000000000, "fmt": "1T"},
            "trailingPE": {"raw": 50.0, "fmt": "50.00"},
            "dividendYield": {}
        }"#;
        let detail: YahooSummaryDetail = serde_json::from_str(json).unwrap();
        assert_eq!(raw(&detail.market_cap), Some(1000000000000.0));
        assert_eq!(raw(&detail.dividend_yield), None);
        assert_eq!(raw(&detail.forward_pe), None);
    }
}
