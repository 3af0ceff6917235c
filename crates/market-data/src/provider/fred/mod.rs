//! FRED (Federal Reserve Economic Data) provider.
//!
//! Two calls per series: `/series` for metadata and `/series/observations`
//! for values. FRED reports missing observations as `"."`, which become
//! `None`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{DataCategory, EconomicSeries, Observation, ProviderRequest, SeriesQuery};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.stlouisfed.org/fred";
const PROVIDER_ID: &str = "FRED";

/// FRED macro-economic data provider.
pub struct FredProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    seriess: Vec<SeriesInfo>,
}

#[derive(Debug, Deserialize)]
struct SeriesInfo {
    id: String,
    title: String,
    units: Option<String>,
    frequency: Option<String>,
    seasonal_adjustment: Option<String>,
    last_updated: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

/// Error body returned with 4xx statuses.
#[derive(Debug, Deserialize)]
struct FredError {
    error_message: Option<String>,
}

impl FredProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::build_client(PROVIDER_ID, timeout)?,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Override the API root. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(
        &self,
        path: &str,
        series_id: &str,
        params: &[(&str, String)],
    ) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_params.push(("series_id", series_id));
        all_params.push(("file_type", "json"));
        all_params.push(("api_key", &self.api_key));

        let url = reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, path), &all_params)
            .map_err(|e| MarketDataError::fatal(PROVIDER_ID, format!("Failed to build URL: {}", e)))?;

        debug!(
            "FRED request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http::classify_send_error(PROVIDER_ID, e))?;

        let status = response.status();
        if status.is_success() {
            return http::read_text(PROVIDER_ID, response).await;
        }

        // FRED answers 400 for both unknown series and bad keys; the body says which.
        if status == StatusCode::BAD_REQUEST {
            let text = http::read_text(PROVIDER_ID, response).await.unwrap_or_default();
            let message = serde_json::from_str::<FredError>(&text)
                .ok()
                .and_then(|e| e.error_message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(classify_bad_request(series_id, message));
        }

        Err(http::classify_status(PROVIDER_ID, series_id, status))
    }

    fn parse_observation(raw: RawObservation) -> Option<Observation> {
        let date = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d").ok()?;
        let value = match raw.value.trim() {
            "." | "" => None,
            v => Decimal::from_str(v).ok(),
        };
        Some(Observation { date, value })
    }
}

fn classify_bad_request(series_id: &str, message: String) -> MarketDataError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("does not exist") {
        MarketDataError::not_found(PROVIDER_ID, series_id)
    } else {
        MarketDataError::fatal(PROVIDER_ID, message)
    }
}

#[async_trait]
impl MarketDataProvider for FredProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            operations: &[DataCategory::Macro],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 120,
            burst_capacity: 10,
        }
    }

    /// Metadata and observations are separate calls.
    fn request_cost(&self, request: &ProviderRequest) -> u32 {
        match request {
            ProviderRequest::Series(_) => 2,
            _ => 1,
        }
    }

    async fn get_series(&self, query: &SeriesQuery) -> Result<EconomicSeries, MarketDataError> {
        let series_id = query.series_id.as_str();

        let text = self.fetch("/series", series_id, &[]).await?;
        let info: SeriesResponse = http::parse_json(PROVIDER_ID, &text)?;
        let info = info
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, series_id))?;

        let mut params = Vec::new();
        if let Some(start) = query.observation_start {
            params.push(("observation_start", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = query.observation_end {
            params.push(("observation_end", end.format("%Y-%m-%d").to_string()));
        }

        let text = self.fetch("/series/observations", series_id, &params).await?;
        let observations: ObservationsResponse = http::parse_json(PROVIDER_ID, &text)?;
        let observations: Vec<Observation> = observations
            .observations
            .into_iter()
            .filter_map(Self::parse_observation)
            .collect();

        debug!(
            "FRED: fetched {} observations for {}",
            observations.len(),
            series_id
        );

        Ok(EconomicSeries {
            series_id: info.id,
            title: info.title,
            units: info.units,
            frequency: info.frequency,
            seasonal_adjustment: info.seasonal_adjustment,
            last_updated: info.last_updated,
            notes: info.notes,
            observations,
            source: PROVIDER_ID.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RetryClass;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_value_becomes_none() {
        let parsed = FredProvider::parse_observation(RawObservation {
            date: "2024-01-01".to_string(),
            value: ".".to_string(),
        })
        .unwrap();
        assert_eq!(parsed.value, None);

        let parsed = FredProvider::parse_observation(RawObservation {
            date: "2024-02-01".to_string(),
            value: "5.33".to_string(),
        })
        .unwrap();
        assert_eq!(parsed.value, Some(dec!(5.33)));
    }

    #[test]
    fn test_bad_request_classification() {
        let err = classify_bad_request(
            "NOPE",
            "Bad Request.  The series does not exist.".to_string(),
        );
        assert_eq!(err.retry_class(), RetryClass::NextCandidate);

        let err = classify_bad_request(
            "GDP",
            "Bad Request.  The value for variable api_key is not registered.".to_string(),
        );
        assert_eq!(err.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_capabilities_are_macro_only() {
        let provider = FredProvider::new("key", Duration::from_secs(5)).unwrap();
        assert!(provider.capabilities().supports(DataCategory::Macro));
        assert!(!provider.capabilities().supports(DataCategory::Quote));
        assert_eq!(provider.rate_limit().requests_per_minute, 120);
    }
}
