//! Request descriptions consumed by the orchestrator and the providers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::ProviderId;
use crate::errors::MarketDataError;

/// Coarse category of a request. Drives cache TTL selection and provider
/// capability filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Quote,
    History,
    Fundamentals,
    Search,
    Macro,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
            Self::Fundamentals => "fundamentals",
            Self::Search => "search",
            Self::Macro => "macro",
        }
    }
}

/// Look-back window for historical prices (Yahoo `range` vocabulary).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl HistoryRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Calendar days covered by this range, relative to `today`.
    /// `None` means unbounded.
    pub fn span_days(&self, today: NaiveDate) -> Option<u64> {
        let days = match self {
            Self::OneDay => 1,
            Self::FiveDays => 5,
            Self::OneMonth => 31,
            Self::ThreeMonths => 92,
            Self::SixMonths => 183,
            Self::OneYear => 366,
            Self::TwoYears => 731,
            Self::FiveYears => 1827,
            Self::TenYears => 3653,
            Self::YearToDate => u64::from(chrono::Datelike::ordinal0(&today)),
            Self::Max => return None,
        };
        Some(days)
    }

    /// Earliest date covered by this range, relative to `today`.
    /// `None` means unbounded.
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        if *self == Self::YearToDate {
            return NaiveDate::from_ymd_opt(chrono::Datelike::year(&today), 1, 1);
        }
        today.checked_sub_days(chrono::Days::new(self.span_days(today)?))
    }
}

impl FromStr for HistoryRange {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "5d" => Ok(Self::FiveDays),
            "1mo" => Ok(Self::OneMonth),
            "3mo" => Ok(Self::ThreeMonths),
            "6mo" => Ok(Self::SixMonths),
            "1y" => Ok(Self::OneYear),
            "2y" => Ok(Self::TwoYears),
            "5y" => Ok(Self::FiveYears),
            "10y" => Ok(Self::TenYears),
            "ytd" => Ok(Self::YearToDate),
            "max" => Ok(Self::Max),
            other => Err(MarketDataError::InvalidInput(format!(
                "Unsupported period '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar size for historical prices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::OneWeek => "1wk",
            Self::OneMonth => "1mo",
        }
    }

    /// Longest look-back served at this bar size, in days. `None` means
    /// any range is accepted.
    pub fn max_lookback_days(&self) -> Option<u64> {
        match self {
            Self::OneMinute => Some(7),
            Self::FiveMinutes | Self::FifteenMinutes | Self::ThirtyMinutes => Some(60),
            Self::OneHour => Some(730),
            Self::OneDay | Self::OneWeek | Self::OneMonth => None,
        }
    }

    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Self::OneMinute
                | Self::FiveMinutes
                | Self::FifteenMinutes
                | Self::ThirtyMinutes
                | Self::OneHour
        )
    }
}

impl FromStr for Interval {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" | "60m" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            "1wk" => Ok(Self::OneWeek),
            "1mo" => Ok(Self::OneMonth),
            other => Err(MarketDataError::InvalidInput(format!(
                "Unsupported interval '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to fetch for an equity symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EquityQuery {
    Quote,
    History {
        range: HistoryRange,
        interval: Interval,
    },
    Fundamentals,
}

impl EquityQuery {
    pub fn category(&self) -> DataCategory {
        match self {
            Self::Quote => DataCategory::Quote,
            Self::History { .. } => DataCategory::History,
            Self::Fundamentals => DataCategory::Fundamentals,
        }
    }

    /// Rejects range/interval pairs no upstream can serve, such as a year
    /// of one-minute bars.
    pub fn validate(&self, today: NaiveDate) -> Result<(), MarketDataError> {
        let Self::History { range, interval } = self else {
            return Ok(());
        };
        let Some(max_days) = interval.max_lookback_days() else {
            return Ok(());
        };
        match range.span_days(today) {
            Some(days) if days <= max_days => Ok(()),
            _ => Err(MarketDataError::InvalidInput(format!(
                "Interval '{}' is only available for periods up to {} days, got '{}'",
                interval, max_days, range
            ))),
        }
    }

    /// Name under which results are cached.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Quote => "stock_quote",
            Self::History { .. } => "stock_history",
            Self::Fundamentals => "stock_fundamentals",
        }
    }
}

/// A stock lookup as issued by a tool handler.
#[derive(Clone, Debug)]
pub struct StockRequest {
    /// Raw user input, with or without exchange suffix.
    pub symbol: String,
    pub query: EquityQuery,
    /// Restrict the lookup to a single provider.
    pub provider: Option<ProviderId>,
}

impl StockRequest {
    pub fn new(symbol: impl Into<String>, query: EquityQuery) -> Self {
        Self {
            symbol: symbol.into(),
            query,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<ProviderId>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// A macro-economic series lookup (FRED vocabulary).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesQuery {
    pub series_id: String,
    pub observation_start: Option<NaiveDate>,
    pub observation_end: Option<NaiveDate>,
}

impl SeriesQuery {
    pub fn new(series_id: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            observation_start: None,
            observation_end: None,
        }
    }

    pub fn starting(mut self, start: NaiveDate) -> Self {
        self.observation_start = Some(start);
        self
    }

    pub fn ending(mut self, end: NaiveDate) -> Self {
        self.observation_end = Some(end);
        self
    }
}

/// A single provider call, fully resolved to the provider's own symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderRequest {
    Quote {
        symbol: String,
    },
    History {
        symbol: String,
        range: HistoryRange,
        interval: Interval,
    },
    Fundamentals {
        symbol: String,
    },
    Search {
        query: String,
        limit: usize,
    },
    Series(SeriesQuery),
}

impl ProviderRequest {
    pub fn for_equity(symbol: String, query: &EquityQuery) -> Self {
        match query {
            EquityQuery::Quote => Self::Quote { symbol },
            EquityQuery::History { range, interval } => Self::History {
                symbol,
                range: *range,
                interval: *interval,
            },
            EquityQuery::Fundamentals => Self::Fundamentals { symbol },
        }
    }

    pub fn category(&self) -> DataCategory {
        match self {
            Self::Quote { .. } => DataCategory::Quote,
            Self::History { .. } => DataCategory::History,
            Self::Fundamentals { .. } => DataCategory::Fundamentals,
            Self::Search { .. } => DataCategory::Search,
            Self::Series(_) => DataCategory::Macro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parsing_is_case_insensitive() {
        assert_eq!("1MO".parse::<HistoryRange>().unwrap(), HistoryRange::OneMonth);
        assert_eq!("ytd".parse::<HistoryRange>().unwrap(), HistoryRange::YearToDate);
        assert!("2w".parse::<HistoryRange>().is_err());
    }

    #[test]
    fn test_interval_accepts_60m_alias() {
        assert_eq!("60m".parse::<Interval>().unwrap(), Interval::OneHour);
        assert!(Interval::OneHour.is_intraday());
        assert!(!Interval::OneDay.is_intraday());
    }

    #[test]
    fn test_range_start_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            HistoryRange::YearToDate.start_date(today),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            HistoryRange::FiveDays.start_date(today),
            NaiveDate::from_ymd_opt(2024, 3, 10)
        );
        assert_eq!(HistoryRange::Max.start_date(today), None);
    }

    #[test]
    fn test_intraday_intervals_limit_the_period() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let history = |range, interval| EquityQuery::History { range, interval };

        assert!(history(HistoryRange::FiveDays, Interval::OneMinute).validate(today).is_ok());
        assert!(history(HistoryRange::OneMonth, Interval::FiveMinutes).validate(today).is_ok());
        assert!(history(HistoryRange::OneYear, Interval::OneHour).validate(today).is_ok());
        assert!(history(HistoryRange::Max, Interval::OneDay).validate(today).is_ok());
        assert!(EquityQuery::Quote.validate(today).is_ok());

        for (range, interval) in [
            (HistoryRange::OneYear, Interval::OneMinute),
            (HistoryRange::ThreeMonths, Interval::FifteenMinutes),
            (HistoryRange::FiveYears, Interval::OneHour),
            (HistoryRange::Max, Interval::ThirtyMinutes),
        ] {
            let err = history(range, interval).validate(today).unwrap_err();
            assert!(matches!(err, MarketDataError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_year_to_date_span_depends_on_today() {
        let january = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let june = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let ytd = EquityQuery::History {
            range: HistoryRange::YearToDate,
            interval: Interval::FiveMinutes,
        };
        assert!(ytd.validate(january).is_ok());
        assert!(ytd.validate(june).is_err());
    }

    #[test]
    fn test_provider_request_category() {
        let request = ProviderRequest::for_equity(
            "TCS.NS".to_string(),
            &EquityQuery::History {
                range: HistoryRange::OneYear,
                interval: Interval::OneWeek,
            },
        );
        assert_eq!(request.category(), DataCategory::History);
        assert_eq!(
            ProviderRequest::Series(SeriesQuery::new("GDP")).category(),
            DataCategory::Macro
        );
    }
}
