//! Yahoo Finance market data provider.
//!
//! This provider uses the public Yahoo Finance endpoints to fetch:
//! - Latest quotes and historical bars (chart API)
//! - Symbol search (search API)
//! - Fundamentals (quoteSummary API, which needs a cookie/crumb pair)
//!
//! Yahoo addresses Indian listings with the `.NS` (NSE) and `.BO` (BSE)
//! suffixes, which are also the canonical candidate suffixes, so symbols are
//! passed through unchanged.

mod models;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use num_traits::FromPrimitive;
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{
    DataCategory, Fundamentals, HistoryRange, Interval, PriceBar, PriceHistory, ProviderRequest,
    Quote, SearchResult,
};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::resolver::Exchange;

use models::{
    raw, YahooApiError, YahooChartResponse, YahooChartResult, YahooQuoteSummaryResponse,
    YahooQuoteSummaryResult, YahooSearchResponse,
};

const PROVIDER_ID: &str = "YAHOO";
const QUERY_BASE_URL: &str = "https://query1.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";

const SUMMARY_MODULES: &str =
    "price,summaryProfile,summaryDetail,defaultKeyStatistics,financialData";

// ============================================================================
// Crumb/Cookie Authentication
// ============================================================================

/// Cached Yahoo authentication data
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

// ============================================================================
// Yahoo Provider
// ============================================================================

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    client: Client,
    query_base: String,
    cookie_url: String,
    crumb: RwLock<Option<CrumbData>>,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with the given per-call timeout.
    pub fn new(timeout: Duration) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::build_client(PROVIDER_ID, timeout)?,
            query_base: QUERY_BASE_URL.to_string(),
            cookie_url: COOKIE_URL.to_string(),
            crumb: RwLock::new(None),
        })
    }

    /// Point the query endpoints (chart, search, crumb, quoteSummary)
    /// somewhere else. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.query_base = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cookie_url(mut self, cookie_url: impl Into<String>) -> Self {
        self.cookie_url = cookie_url.into();
        self
    }

    fn read_crumb(&self) -> RwLockReadGuard<'_, Option<CrumbData>> {
        self.crumb.read().unwrap_or_else(|poisoned| {
            warn!("Yahoo crumb lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_crumb(&self) -> RwLockWriteGuard<'_, Option<CrumbData>> {
        self.crumb.write().unwrap_or_else(|poisoned| {
            warn!("Yahoo crumb lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Ensure we have a valid Yahoo authentication crumb.
    async fn ensure_crumb(&self) -> Result<CrumbData, MarketDataError> {
        if let Some(crumb) = self.read_crumb().as_ref() {
            return Ok(crumb.clone());
        }
        self.fetch_crumb().await
    }

    /// Fetch a new cookie, then a crumb bound to it.
    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        // The cookie endpoint answers 404 but still sets the cookie.
        let response = self
            .client
            .get(&self.cookie_url)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(';').next())
            .map(str::to_string)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MarketDataError::transient(PROVIDER_ID, "Failed to obtain Yahoo cookie"))?;

        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.query_base))
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(http::classify_status(PROVIDER_ID, "crumb", status));
        }
        if !status.is_success() {
            return Err(MarketDataError::transient(
                PROVIDER_ID,
                format!("Yahoo crumb request failed: HTTP {}", status),
            ));
        }

        let crumb = http::read_text(PROVIDER_ID, response).await?.trim().to_string();
        if crumb.is_empty() {
            return Err(MarketDataError::transient(PROVIDER_ID, "Empty Yahoo crumb"));
        }

        let crumb_data = CrumbData { cookie, crumb };
        *self.write_crumb() = Some(crumb_data.clone());
        Ok(crumb_data)
    }

    /// Clear the cached crumb (used when authentication fails)
    fn clear_crumb(&self) {
        *self.write_crumb() = None;
    }

    // ========================================================================
    // Chart API
    // ========================================================================

    async fn fetch_chart(
        &self,
        symbol: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<YahooChartResult, MarketDataError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}",
            self.query_base,
            encode(symbol),
            range.as_str(),
            yahoo_interval(interval)
        );
        debug!("Yahoo chart request: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http::classify_status(PROVIDER_ID, symbol, status));
        }

        let text = http::read_text(PROVIDER_ID, response).await?;
        let data: YahooChartResponse = http::parse_json(PROVIDER_ID, &text)?;

        if let Some(error) = data.chart.error {
            return Err(api_error(symbol, &error));
        }

        data.chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))
    }

    /// Zip the columnar chart arrays into bars, dropping rows without a close.
    fn chart_bars(result: &YahooChartResult) -> Vec<PriceBar> {
        let Some(timestamps) = result.timestamp.as_ref() else {
            return Vec::new();
        };
        let Some(columns) = result
            .indicators
            .as_ref()
            .and_then(|indicators| indicators.quote.first())
        else {
            return Vec::new();
        };

        let at = |values: &Vec<Option<f64>>, i: usize| -> Option<Decimal> {
            values.get(i).copied().flatten().and_then(Decimal::from_f64)
        };

        timestamps
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let close = at(&columns.close, i)?;
                let timestamp = Utc.timestamp_opt(*ts, 0).single()?;
                Some(PriceBar {
                    timestamp,
                    open: at(&columns.open, i),
                    high: at(&columns.high, i),
                    low: at(&columns.low, i),
                    close,
                    volume: columns.volume.get(i).copied().flatten(),
                })
            })
            .collect()
    }

    fn chart_to_quote(symbol: &str, result: &YahooChartResult) -> Result<Quote, MarketDataError> {
        let meta = &result.meta;
        let bars = Self::chart_bars(result);
        let last = bars.last();

        let price = meta
            .regular_market_price
            .and_then(Decimal::from_f64)
            .or_else(|| last.map(|bar| bar.close))
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

        let timestamp: DateTime<Utc> = meta
            .regular_market_time
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| last.map(|bar| bar.timestamp))
            .unwrap_or_else(Utc::now);

        let previous_close = if bars.len() >= 2 {
            Some(bars[bars.len() - 2].close)
        } else {
            meta.previous_close.and_then(Decimal::from_f64)
        };

        let mut quote = Quote::new(meta.symbol.clone(), price, timestamp, PROVIDER_ID);
        quote.name = meta.long_name.clone().or_else(|| meta.short_name.clone());
        quote.exchange = meta
            .full_exchange_name
            .clone()
            .or_else(|| meta.exchange_name.clone());
        quote.currency = meta.currency.clone();
        quote.open = last.and_then(|bar| bar.open);
        quote.day_high = meta
            .regular_market_day_high
            .and_then(Decimal::from_f64)
            .or_else(|| last.and_then(|bar| bar.high));
        quote.day_low = meta
            .regular_market_day_low
            .and_then(Decimal::from_f64)
            .or_else(|| last.and_then(|bar| bar.low));
        quote.previous_close = previous_close;
        quote.volume = meta
            .regular_market_volume
            .or_else(|| last.and_then(|bar| bar.volume));
        quote.fifty_two_week_high = meta.fifty_two_week_high.and_then(Decimal::from_f64);
        quote.fifty_two_week_low = meta.fifty_two_week_low.and_then(Decimal::from_f64);
        Ok(quote)
    }

    // ========================================================================
    // quoteSummary API
    // ========================================================================

    async fn fetch_quote_summary(
        &self,
        symbol: &str,
    ) -> Result<YahooQuoteSummaryResult, MarketDataError> {
        let crumb = self.ensure_crumb().await?;

        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}&crumb={}",
            self.query_base,
            encode(symbol),
            SUMMARY_MODULES,
            encode(&crumb.crumb)
        );

        let response = self
            .client
            .get(&url)
            .header(header::COOKIE, &crumb.cookie)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // A stale crumb is recoverable: the retry fetches a new one.
            self.clear_crumb();
            return Err(MarketDataError::transient(
                PROVIDER_ID,
                "Yahoo authentication expired",
            ));
        }
        if !status.is_success() {
            return Err(http::classify_status(PROVIDER_ID, symbol, status));
        }

        let text = http::read_text(PROVIDER_ID, response).await?;
        let data: YahooQuoteSummaryResponse = http::parse_json(PROVIDER_ID, &text)?;

        if let Some(error) = data.quote_summary.error {
            return Err(api_error(symbol, &error));
        }

        data.quote_summary
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))
    }

    fn summary_to_fundamentals(symbol: &str, result: YahooQuoteSummaryResult) -> Fundamentals {
        let mut fundamentals = Fundamentals {
            symbol: symbol.to_string(),
            source: PROVIDER_ID.to_string(),
            ..Default::default()
        };

        if let Some(price) = result.price {
            fundamentals.name = price.long_name.or(price.short_name);
            fundamentals.currency = price.currency;
        }
        if let Some(profile) = result.summary_profile {
            fundamentals.sector = profile.sector;
            fundamentals.industry = profile.industry;
            fundamentals.description = profile.long_business_summary;
            fundamentals.country = profile.country;
        }
        if let Some(detail) = result.summary_detail {
            fundamentals.market_cap = raw(&detail.market_cap);
            fundamentals.pe_ratio = raw(&detail.trailing_pe);
            fundamentals.forward_pe = raw(&detail.forward_pe);
            fundamentals.dividend_yield = raw(&detail.dividend_yield);
            fundamentals.beta = raw(&detail.beta);
            fundamentals.week_52_high = raw(&detail.fifty_two_week_high);
            fundamentals.week_52_low = raw(&detail.fifty_two_week_low);
        }
        if let Some(stats) = result.default_key_statistics {
            fundamentals.peg_ratio = raw(&stats.peg_ratio);
            fundamentals.price_to_book = raw(&stats.price_to_book);
            fundamentals.eps = raw(&stats.trailing_eps);
        }
        if let Some(financials) = result.financial_data {
            fundamentals.profit_margin = raw(&financials.profit_margins);
            fundamentals.return_on_equity = raw(&financials.return_on_equity);
            fundamentals.revenue_ttm = raw(&financials.total_revenue);
        }
        fundamentals
    }
}

/// Yahoo only knows "60m" for hourly bars.
fn yahoo_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::OneHour => "60m",
        other => other.as_str(),
    }
}

fn api_error(symbol: &str, error: &YahooApiError) -> MarketDataError {
    if error.is_not_found() {
        MarketDataError::not_found(PROVIDER_ID, symbol)
    } else {
        MarketDataError::fatal(PROVIDER_ID, error.message())
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
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
            requests_per_minute: 60,
            burst_capacity: 10,
        }
    }

    /// Fundamentals without a live session also pay for the cookie and
    /// crumb requests.
    fn request_cost(&self, request: &ProviderRequest) -> u32 {
        match request {
            ProviderRequest::Fundamentals { .. } if self.read_crumb().is_none() => 3,
            _ => 1,
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let result = self
            .fetch_chart(symbol, HistoryRange::FiveDays, Interval::OneDay)
            .await?;
        Self::chart_to_quote(symbol, &result)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<PriceHistory, MarketDataError> {
        let result = self.fetch_chart(symbol, range, interval).await?;
        let bars = Self::chart_bars(&result);
        if bars.is_empty() {
            return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
        }

        Ok(PriceHistory {
            symbol: result.meta.symbol.clone(),
            range,
            interval,
            currency: result.meta.currency.clone(),
            bars,
            source: PROVIDER_ID.to_string(),
        })
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let result = self.fetch_quote_summary(symbol).await?;
        Ok(Self::summary_to_fundamentals(symbol, result))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MarketDataError> {
        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount={}&newsCount=0",
            self.query_base,
            encode(query),
            limit
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http::classify_status(PROVIDER_ID, query, status));
        }

        let text = http::read_text(PROVIDER_ID, response).await?;
        let data: YahooSearchResponse = http::parse_json(PROVIDER_ID, &text)?;

        let results = data
            .quotes
            .into_iter()
            .filter_map(|item| {
                let symbol = item.symbol?;
                let name = item
                    .longname
                    .or(item.shortname)
                    .unwrap_or_else(|| symbol.clone());
                let exchange = item.exch_disp.or(item.exchange).unwrap_or_default();
                let asset_type = item.quote_type.unwrap_or_else(|| "EQUITY".to_string());

                let mut result = SearchResult::new(symbol.clone(), name, exchange, asset_type);
                let listed_in_india = symbol
                    .rsplit_once('.')
                    .and_then(|(_, suffix)| Exchange::from_suffix(suffix));
                if let Some(exchange) = listed_in_india {
                    result = result.with_currency(exchange.currency());
                }
                if let Some(score) = item.score {
                    result = result.with_score(score);
                }
                Some(result)
            })
            .take(limit)
            .collect();

        Ok(results)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT).expect("failed to build Yahoo HTTP client")
    }
}
