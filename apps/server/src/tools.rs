//! Tool catalogue and dispatch.
//!
//! Every tool is a thin wrapper: parse arguments, call the orchestrator,
//! shape the result. Retrieval policy lives in the market-data crate.

use chrono::{DateTime, Days, NaiveDate, Utc};
use financemcp_market_data::{
    EconomicSeries, EquityQuery, HistoryRange, Interval, MarketDataError, Payload, Quote,
    RetrievalOrchestrator, SeriesQuery, StockRequest,
};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ToolParameter {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ToolParameter],
}

const fn param(
    name: &'static str,
    kind: &'static str,
    required: bool,
    description: &'static str,
) -> ToolParameter {
    ToolParameter {
        name,
        kind,
        required,
        description,
    }
}

const SYMBOL: ToolParameter = param(
    "symbol",
    "string",
    true,
    "Ticker, bare (RELIANCE) or exchange-qualified (RELIANCE.NS, TCS.BO)",
);

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_stock_price",
        description: "Current price, change and volume for an Indian equity",
        parameters: &[
            SYMBOL,
            param("source", "string", false, "Preferred provider: yahoo or alpha_vantage"),
        ],
    },
    ToolSpec {
        name: "get_stock_quote",
        description: "Full quote snapshot for an Indian equity",
        parameters: &[SYMBOL],
    },
    ToolSpec {
        name: "get_stock_history",
        description: "Historical OHLCV bars",
        parameters: &[
            SYMBOL,
            param("period", "string", false, "Look-back window, e.g. 5d, 1mo, 1y, ytd (default 1mo)"),
            param("interval", "string", false, "Bar size, e.g. 1h, 1d, 1wk (default 1d)"),
        ],
    },
    ToolSpec {
        name: "get_stock_fundamentals",
        description: "Company profile and valuation ratios",
        parameters: &[SYMBOL],
    },
    ToolSpec {
        name: "search_stocks",
        description: "Search symbols by name or ticker, NSE and BSE listings first",
        parameters: &[
            param("query", "string", true, "Company name or ticker fragment"),
            param("limit", "integer", false, "Maximum results, 1 to 50 (default 10)"),
        ],
    },
    ToolSpec {
        name: "get_economic_indicator",
        description: "Observations for any FRED series",
        parameters: &[
            param("series_id", "string", true, "FRED series id, e.g. GDP, UNRATE"),
            param("observation_start", "date", false, "First observation date (YYYY-MM-DD)"),
            param("observation_end", "date", false, "Last observation date (YYYY-MM-DD)"),
        ],
    },
    ToolSpec {
        name: "get_fed_rates",
        description: "Federal funds effective rate and bank prime loan rate",
        parameters: &[],
    },
    ToolSpec {
        name: "get_inflation_data",
        description: "CPI, core CPI and PCE price index",
        parameters: &[],
    },
    ToolSpec {
        name: "get_gdp_data",
        description: "Real and nominal gross domestic product",
        parameters: &[],
    },
    ToolSpec {
        name: "get_unemployment_data",
        description: "Unemployment and labor force participation rates",
        parameters: &[],
    },
    ToolSpec {
        name: "get_popular_indicators",
        description: "Frequently used FRED series ids",
        parameters: &[],
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PopularIndicator {
    pub series_id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub frequency: &'static str,
}

const fn indicator(
    series_id: &'static str,
    title: &'static str,
    category: &'static str,
    frequency: &'static str,
) -> PopularIndicator {
    PopularIndicator {
        series_id,
        title,
        category,
        frequency,
    }
}

pub const POPULAR_INDICATORS: [PopularIndicator; 15] = [
    indicator("GDP", "Gross Domestic Product", "National Accounts", "Quarterly"),
    indicator("GDPC1", "Real Gross Domestic Product", "National Accounts", "Quarterly"),
    indicator("UNRATE", "Unemployment Rate", "Labor Market", "Monthly"),
    indicator("CPIAUCSL", "Consumer Price Index for All Urban Consumers", "Prices", "Monthly"),
    indicator(
        "CPILFESL",
        "Consumer Price Index for All Urban Consumers: All Items Less Food and Energy",
        "Prices",
        "Monthly",
    ),
    indicator(
        "PCEPI",
        "Personal Consumption Expenditures: Chain-type Price Index",
        "Prices",
        "Monthly",
    ),
    indicator("FEDFUNDS", "Federal Funds Effective Rate", "Interest Rates", "Monthly"),
    indicator("DGS10", "10-Year Treasury Constant Maturity Rate", "Interest Rates", "Daily"),
    indicator("DGS2", "2-Year Treasury Constant Maturity Rate", "Interest Rates", "Daily"),
    indicator("CIVPART", "Labor Force Participation Rate", "Labor Market", "Monthly"),
    indicator("PAYEMS", "Total Nonfarm Payrolls", "Labor Market", "Monthly"),
    indicator("INDPRO", "Industrial Production: Total Index", "Production", "Monthly"),
    indicator("RSXFS", "Advance Retail Sales: Retail and Food Services", "Consumption", "Monthly"),
    indicator(
        "HOUST",
        "Housing Starts: Total: New Privately Owned Housing Units Started",
        "Housing",
        "Monthly",
    ),
    indicator("M2SL", "M2 Money Stock", "Money Supply", "Monthly"),
];

/// A fixed set of series fetched together: (output key, series id).
struct SeriesSet {
    series: &'static [(&'static str, &'static str)],
    lookback_days: u64,
}

const FED_RATES: SeriesSet = SeriesSet {
    series: &[("federal_funds_rate", "FEDFUNDS"), ("prime_rate", "DPRIME")],
    lookback_days: 365,
};

const INFLATION: SeriesSet = SeriesSet {
    series: &[
        ("cpi_all_urban", "CPIAUCSL"),
        ("core_cpi", "CPILFESL"),
        ("pce_price_index", "PCEPI"),
    ],
    lookback_days: 365,
};

const GDP: SeriesSet = SeriesSet {
    series: &[("real_gdp", "GDPC1"), ("nominal_gdp", "GDP")],
    lookback_days: 730,
};

const UNEMPLOYMENT: SeriesSet = SeriesSet {
    series: &[
        ("unemployment_rate", "UNRATE"),
        ("labor_force_participation", "CIVPART"),
    ],
    lookback_days: 365,
};

// ============================================================================
// Arguments and results
// ============================================================================

#[derive(Deserialize)]
struct PriceArgs {
    symbol: String,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Deserialize)]
struct SymbolArgs {
    symbol: String,
}

#[derive(Deserialize)]
struct HistoryArgs {
    symbol: String,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    interval: Option<String>,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SeriesArgs {
    series_id: String,
    #[serde(default)]
    observation_start: Option<NaiveDate>,
    #[serde(default)]
    observation_end: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl From<Quote> for PriceSnapshot {
    fn from(quote: Quote) -> Self {
        Self {
            change: quote.change(),
            change_percent: quote.change_percent(),
            symbol: quote.symbol,
            price: quote.price,
            volume: quote.volume,
            market_cap: quote.market_cap,
            timestamp: quote.timestamp,
            source: quote.source,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct IndicatorSummary {
    pub series_id: String,
    pub title: String,
    pub units: Option<String>,
    pub current: Option<Decimal>,
    pub previous: Option<Decimal>,
    pub change: Option<Decimal>,
    pub last_observation: Option<NaiveDate>,
}

impl From<&EconomicSeries> for IndicatorSummary {
    fn from(series: &EconomicSeries) -> Self {
        let (latest, prior) = series.latest_values();
        let current = latest.and_then(|o| o.value);
        let previous = prior.and_then(|o| o.value);
        Self {
            series_id: series.series_id.clone(),
            title: series.title.clone(),
            units: series.units.clone(),
            current,
            previous,
            change: current.zip(previous).map(|(c, p)| c - p),
            last_observation: latest.map(|o| o.date),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Run a tool by name with JSON arguments.
pub async fn call_tool(
    orchestrator: &RetrievalOrchestrator,
    name: &str,
    args: Value,
) -> ApiResult<Value> {
    let tool = find_tool(name).ok_or_else(|| ApiError::UnknownTool(name.to_string()))?;
    debug!("Calling tool {}", tool.name);

    match tool.name {
        "get_stock_price" => {
            let args: PriceArgs = parse_args(name, args)?;
            let mut request = StockRequest::new(args.symbol, EquityQuery::Quote);
            if let Some(source) = args.source {
                request = request.with_provider(provider_for_source(&source)?);
            }
            let quote = expect_quote(orchestrator.fetch_stock_datum(&request).await?)?;
            to_value(PriceSnapshot::from(quote))
        }
        "get_stock_quote" => {
            let args: SymbolArgs = parse_args(name, args)?;
            let request = StockRequest::new(args.symbol, EquityQuery::Quote);
            to_value(expect_quote(orchestrator.fetch_stock_datum(&request).await?)?)
        }
        "get_stock_history" => {
            let args: HistoryArgs = parse_args(name, args)?;
            let range: HistoryRange = args.period.as_deref().unwrap_or("1mo").parse()?;
            let interval: Interval = args.interval.as_deref().unwrap_or("1d").parse()?;
            let request = StockRequest::new(args.symbol, EquityQuery::History { range, interval });
            match orchestrator.fetch_stock_datum(&request).await? {
                Payload::History(history) => to_value(history),
                other => Err(unexpected(name, &other)),
            }
        }
        "get_stock_fundamentals" => {
            let args: SymbolArgs = parse_args(name, args)?;
            let request = StockRequest::new(args.symbol, EquityQuery::Fundamentals);
            match orchestrator.fetch_stock_datum(&request).await? {
                Payload::Fundamentals(fundamentals) => to_value(fundamentals),
                other => Err(unexpected(name, &other)),
            }
        }
        "search_stocks" => {
            let args: SearchArgs = parse_args(name, args)?;
            let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
            if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
                return Err(ApiError::BadRequest(format!(
                    "limit must be between 1 and {}",
                    MAX_SEARCH_LIMIT
                )));
            }
            let results = orchestrator.search_symbols(&args.query, limit).await?;
            Ok(json!({
                "query": args.query.trim(),
                "count": results.len(),
                "results": results,
            }))
        }
        "get_economic_indicator" => {
            let args: SeriesArgs = parse_args(name, args)?;
            let mut query = SeriesQuery::new(args.series_id);
            if let Some(start) = args.observation_start {
                query = query.starting(start);
            }
            if let Some(end) = args.observation_end {
                query = query.ending(end);
            }
            let series = orchestrator.fetch_series(&query).await?;
            let count = series.observations.len();
            let mut value = to_value(series)?;
            if let Value::Object(map) = &mut value {
                map.insert("count".to_string(), json!(count));
            }
            Ok(value)
        }
        "get_fed_rates" => series_set(orchestrator, &FED_RATES).await,
        "get_inflation_data" => series_set(orchestrator, &INFLATION).await,
        "get_gdp_data" => series_set(orchestrator, &GDP).await,
        "get_unemployment_data" => series_set(orchestrator, &UNEMPLOYMENT).await,
        "get_popular_indicators" => Ok(json!({
            "count": POPULAR_INDICATORS.len(),
            "indicators": POPULAR_INDICATORS,
        })),
        _ => Err(ApiError::UnknownTool(name.to_string())),
    }
}

/// Fetch a fixed series set concurrently. One failure fails the tool.
async fn series_set(orchestrator: &RetrievalOrchestrator, set: &SeriesSet) -> ApiResult<Value> {
    let today = Utc::now().date_naive();
    let start = today.checked_sub_days(Days::new(set.lookback_days));

    let fetches = set.series.iter().map(|(key, series_id)| async move {
        let mut query = SeriesQuery::new(*series_id);
        if let Some(start) = start {
            query = query.starting(start);
        }
        let series = orchestrator.fetch_series(&query).await?;
        Ok::<_, MarketDataError>((*key, IndicatorSummary::from(&series)))
    });
    let summaries = try_join_all(fetches).await?;

    let mut indicators = Map::new();
    for (key, summary) in summaries {
        indicators.insert(key.to_string(), to_value(summary)?);
    }
    Ok(json!({
        "indicators": indicators,
        "timestamp": Utc::now(),
    }))
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> ApiResult<T> {
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| ApiError::BadRequest(format!("Invalid arguments for {}: {}", tool, e)))
}

fn provider_for_source(source: &str) -> ApiResult<&'static str> {
    match source.trim().to_ascii_lowercase().as_str() {
        "yahoo" => Ok("YAHOO"),
        "alpha_vantage" => Ok("ALPHA_VANTAGE"),
        other => Err(ApiError::BadRequest(format!(
            "Unknown source '{}', expected yahoo or alpha_vantage",
            other
        ))),
    }
}

fn expect_quote(payload: Payload) -> ApiResult<Quote> {
    match payload {
        Payload::Quote(quote) => Ok(quote),
        other => Err(unexpected("quote", &other)),
    }
}

fn unexpected(tool: &str, payload: &Payload) -> ApiError {
    ApiError::Internal(format!(
        "{} received a {} payload",
        tool,
        payload.category().as_str()
    ))
}

fn to_value<T: Serialize>(value: T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use financemcp_market_data::Observation;
    use rust_decimal_macros::dec;

    fn series(values: &[(u32, Option<Decimal>)]) -> EconomicSeries {
        EconomicSeries {
            series_id: "UNRATE".to_string(),
            title: "Unemployment Rate".to_string(),
            units: Some("Percent".to_string()),
            frequency: Some("Monthly".to_string()),
            seasonal_adjustment: None,
            last_updated: None,
            notes: None,
            observations: values
                .iter()
                .map(|(month, value)| Observation {
                    date: NaiveDate::from_ymd_opt(2024, *month, 1).unwrap(),
                    value: *value,
                })
                .collect(),
            source: "FRED".to_string(),
        }
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let mut names: Vec<_> = TOOLS.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TOOLS.len());
        assert_eq!(TOOLS.len(), 11);
        assert!(find_tool("get_fed_rates").is_some());
        assert!(find_tool("get_crypto_price").is_none());
    }

    #[test]
    fn test_indicator_summary() {
        let summary = IndicatorSummary::from(&series(&[
            (1, Some(dec!(3.7))),
            (2, Some(dec!(3.9))),
            (3, None),
        ]));
        assert_eq!(summary.current, Some(dec!(3.9)));
        assert_eq!(summary.previous, Some(dec!(3.7)));
        assert_eq!(summary.change, Some(dec!(0.2)));
        assert_eq!(summary.last_observation, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn test_indicator_summary_with_single_value() {
        let summary = IndicatorSummary::from(&series(&[(1, Some(dec!(3.7)))]));
        assert_eq!(summary.current, Some(dec!(3.7)));
        assert_eq!(summary.previous, None);
        assert_eq!(summary.change, None);
    }

    #[test]
    fn test_source_mapping() {
        assert_eq!(provider_for_source("Yahoo").unwrap(), "YAHOO");
        assert_eq!(provider_for_source("alpha_vantage").unwrap(), "ALPHA_VANTAGE");
        assert!(matches!(provider_for_source("nse"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_argument_errors_are_bad_requests() {
        let result: ApiResult<SymbolArgs> = parse_args("get_stock_quote", json!({}));
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let result: ApiResult<SearchArgs> = parse_args("search_stocks", json!({"query": "tcs"}));
        assert_eq!(result.unwrap().limit, None);
    }
}
