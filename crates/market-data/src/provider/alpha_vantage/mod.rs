//! Alpha Vantage market data provider implementation.
//!
//! This module provides market data from the Alpha Vantage API:
//! - Latest quotes via GLOBAL_QUOTE
//! - Daily bars via TIME_SERIES_DAILY
//! - Company fundamentals via OVERVIEW
//! - Symbol lookup via SYMBOL_SEARCH
//!
//! Alpha Vantage lists Indian equities on BSE only, spelled `TICKER.BSE`.
//! NSE candidates are skipped before any call is made.
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{
    DataCategory, Fundamentals, HistoryRange, Interval, PriceBar, PriceHistory, Quote,
    SearchResult,
};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::resolver::{Exchange, SymbolCandidate};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Alpha Vantage market data provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// Error fields Alpha Vantage embeds in a 200 response.
#[derive(Debug, Default, Deserialize)]
struct ApiNotice {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

/// GLOBAL_QUOTE response
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(flatten)]
    notice: ApiNotice,
}

/// TIME_SERIES_DAILY response for equities
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyBar>>,
    #[serde(flatten)]
    notice: ApiNotice,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// OVERVIEW response for company fundamentals.
/// Only the mapped fields are listed; the API returns many more.
#[derive(Debug, Deserialize)]
struct CompanyOverviewResponse {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Currency")]
    currency: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "ForwardPE")]
    forward_pe: Option<String>,
    #[serde(rename = "PEGRatio")]
    peg_ratio: Option<String>,
    #[serde(rename = "PriceToBookRatio")]
    price_to_book: Option<String>,
    #[serde(rename = "DividendYield")]
    dividend_yield: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    #[serde(rename = "Beta")]
    beta: Option<String>,
    #[serde(rename = "ProfitMargin")]
    profit_margin: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM")]
    return_on_equity: Option<String>,
    #[serde(rename = "RevenueTTM")]
    revenue_ttm: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<String>,
    #[serde(flatten)]
    notice: ApiNotice,
}

/// SYMBOL_SEARCH response
#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<HashMap<String, String>>,
    #[serde(flatten)]
    notice: ApiNotice,
}

impl CompanyOverviewResponse {
    /// Parse a string field as f64, handling "None" and "-" values
    fn parse_f64(s: &Option<String>) -> Option<f64> {
        s.as_ref()
            .filter(|v| !v.is_empty() && *v != "None" && *v != "-")
            .and_then(|v| v.parse::<f64>().ok())
    }

    fn text(s: &Option<String>) -> Option<String> {
        s.as_ref()
            .filter(|v| !v.is_empty() && *v != "None")
            .cloned()
    }

    fn into_fundamentals(self, symbol: &str) -> Fundamentals {
        Fundamentals {
            symbol: symbol.to_string(),
            source: PROVIDER_ID.to_string(),
            name: Self::text(&self.name),
            sector: Self::text(&self.sector),
            industry: Self::text(&self.industry),
            description: Self::text(&self.description),
            country: Self::text(&self.country),
            currency: Self::text(&self.currency),
            market_cap: Self::parse_f64(&self.market_capitalization),
            pe_ratio: Self::parse_f64(&self.pe_ratio),
            forward_pe: Self::parse_f64(&self.forward_pe),
            peg_ratio: Self::parse_f64(&self.peg_ratio),
            price_to_book: Self::parse_f64(&self.price_to_book),
            dividend_yield: Self::parse_f64(&self.dividend_yield),
            eps: Self::parse_f64(&self.eps),
            beta: Self::parse_f64(&self.beta),
            profit_margin: Self::parse_f64(&self.profit_margin),
            return_on_equity: Self::parse_f64(&self.return_on_equity),
            revenue_ttm: Self::parse_f64(&self.revenue_ttm),
            week_52_high: Self::parse_f64(&self.week_52_high),
            week_52_low: Self::parse_f64(&self.week_52_low),
        }
    }
}

// ============================================================================
// AlphaVantageProvider implementation
// ============================================================================

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::build_client(PROVIDER_ID, timeout)?,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Override the query endpoint. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, symbol: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(&self.base_url, &all_params).map_err(|e| {
            MarketDataError::fatal(PROVIDER_ID, format!("Failed to build URL: {}", e))
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http::classify_status(PROVIDER_ID, symbol, status));
        }

        http::read_text(PROVIDER_ID, response).await
    }

    /// Check for API-level errors in the response.
    fn check_api_error(symbol: &str, notice: &ApiNotice) -> Result<(), MarketDataError> {
        if let Some(ref msg) = notice.error_message {
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
            }
            return Err(MarketDataError::fatal(PROVIDER_ID, msg.clone()));
        }

        // "Note" and "Information" carry throttling and key problems
        for msg in [&notice.note, &notice.information].into_iter().flatten() {
            if is_throttle_message(msg) {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                    retry_after: None,
                });
            }
            if msg.to_ascii_lowercase().contains("apikey") {
                return Err(MarketDataError::fatal(PROVIDER_ID, msg.clone()));
            }
            warn!("Alpha Vantage notice: {}", msg);
        }

        Ok(())
    }

    /// Parse a date string in YYYY-MM-DD format.
    fn parse_date(date_str: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
    }

    /// Parse a decimal value from a string.
    fn parse_decimal(s: &str) -> Option<Decimal> {
        Decimal::from_str(s.trim()).ok()
    }

    fn parse_quote(symbol: &str, fields: &HashMap<String, String>) -> Option<Quote> {
        let field = |name: &str| fields.get(name).map(String::as_str);

        let price = field("05. price").and_then(Self::parse_decimal)?;
        let timestamp = field("07. latest trading day")
            .and_then(Self::parse_date)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(canonical_symbol(symbol), price, timestamp, PROVIDER_ID);
        quote.open = field("02. open").and_then(Self::parse_decimal);
        quote.day_high = field("03. high").and_then(Self::parse_decimal);
        quote.day_low = field("04. low").and_then(Self::parse_decimal);
        quote.volume = field("06. volume").and_then(|v| v.trim().parse().ok());
        quote.previous_close = field("08. previous close").and_then(Self::parse_decimal);
        if symbol.ends_with(".BSE") {
            quote.exchange = Some(Exchange::Bse.code().to_string());
            quote.currency = Some(Exchange::Bse.currency().to_string());
        }
        Some(quote)
    }

    fn parse_bars(series: HashMap<String, DailyBar>, start: Option<NaiveDate>) -> Vec<PriceBar> {
        let mut bars: Vec<PriceBar> = series
            .into_iter()
            .filter_map(|(date_str, daily)| {
                let date = Self::parse_date(&date_str)?;
                if start.is_some_and(|start| date < start) {
                    return None;
                }
                let timestamp = Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()?;
                Some(PriceBar {
                    timestamp,
                    open: Self::parse_decimal(&daily.open),
                    high: Self::parse_decimal(&daily.high),
                    low: Self::parse_decimal(&daily.low),
                    close: Self::parse_decimal(&daily.close)?,
                    volume: daily.volume.trim().parse().ok(),
                })
            })
            .collect();

        // Sort by timestamp ascending
        bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        bars
    }

    fn parse_search_match(fields: &HashMap<String, String>) -> Option<SearchResult> {
        let symbol = fields.get("1. symbol")?;
        let name = fields.get("2. name").cloned().unwrap_or_else(|| symbol.clone());
        let asset_type = fields
            .get("3. type")
            .map(|t| match t.to_uppercase().as_str() {
                "EQUITY" | "COMMON STOCK" => "EQUITY".to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "EQUITY".to_string());

        let exchange = if symbol.ends_with(".BSE") {
            Exchange::Bse.code().to_string()
        } else {
            fields.get("4. region").cloned().unwrap_or_default()
        };

        let mut result = SearchResult::new(canonical_symbol(symbol), name, exchange, asset_type);
        if let Some(currency) = fields.get("8. currency") {
            result = result.with_currency(currency.clone());
        }
        if let Some(score) = fields.get("9. matchScore").and_then(|s| s.parse::<f64>().ok()) {
            result = result.with_score(score);
        }
        Some(result)
    }
}

/// Throttle notices are phrased a few different ways.
fn is_throttle_message(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("call frequency") || lower.contains("rate limit")
}

/// `RELIANCE.BSE` -> `RELIANCE.BO`; anything else unchanged.
fn canonical_symbol(symbol: &str) -> String {
    match symbol.strip_suffix(".BSE") {
        Some(base) => format!("{}{}", base, Exchange::Bse.suffix()),
        None => symbol.to_string(),
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            operations: &[
                DataCategory::Quote,
                DataCategory::History,
                DataCategory::Fundamentals,
                DataCategory::Search,
            ],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 5,
            burst_capacity: 1,
        }
    }

    fn provider_symbol(&self, candidate: &SymbolCandidate) -> Option<String> {
        candidate
            .exchange
            .alpha_vantage_suffix()
            .map(|suffix| format!("{}{}", candidate.base, suffix))
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let text = self
            .fetch(symbol, &[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;
        let response: GlobalQuoteResponse = http::parse_json(PROVIDER_ID, &text)?;
        Self::check_api_error(symbol, &response.notice)?;

        response
            .global_quote
            .as_ref()
            .and_then(|fields| Self::parse_quote(symbol, fields))
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<PriceHistory, MarketDataError> {
        if interval != Interval::OneDay {
            return Err(MarketDataError::not_supported(
                PROVIDER_ID,
                &format!("{} history", interval),
            ));
        }

        // 'full' is premium-only; 'compact' covers roughly 100 trading days.
        let text = self
            .fetch(
                symbol,
                &[
                    ("function", "TIME_SERIES_DAILY"),
                    ("symbol", symbol),
                    ("outputsize", "compact"),
                ],
            )
            .await?;
        let response: TimeSeriesResponse = http::parse_json(PROVIDER_ID, &text)?;
        Self::check_api_error(symbol, &response.notice)?;

        let series = response
            .time_series
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

        let start = range.start_date(Utc::now().date_naive());
        let bars = Self::parse_bars(series, start);
        if bars.is_empty() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        debug!("Alpha Vantage: fetched {} bars for {}", bars.len(), symbol);

        Ok(PriceHistory {
            symbol: canonical_symbol(symbol),
            range,
            interval,
            currency: symbol
                .ends_with(".BSE")
                .then(|| Exchange::Bse.currency().to_string()),
            bars,
            source: PROVIDER_ID.to_string(),
        })
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let text = self
            .fetch(symbol, &[("function", "OVERVIEW"), ("symbol", symbol)])
            .await?;
        let response: CompanyOverviewResponse = http::parse_json(PROVIDER_ID, &text)?;
        Self::check_api_error(symbol, &response.notice)?;

        // An unknown symbol comes back as an empty object
        if response.symbol.is_none() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        Ok(response.into_fundamentals(&canonical_symbol(symbol)))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MarketDataError> {
        let text = self
            .fetch(query, &[("function", "SYMBOL_SEARCH"), ("keywords", query)])
            .await?;
        let response: SymbolSearchResponse = http::parse_json(PROVIDER_ID, &text)?;
        Self::check_api_error(query, &response.notice)?;

        Ok(response
            .best_matches
            .iter()
            .filter_map(Self::parse_search_match)
            .take(limit)
            .collect())
    }
}
