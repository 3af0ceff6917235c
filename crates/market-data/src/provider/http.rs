//! Shared HTTP plumbing for the provider clients.
//!
//! Every provider maps transport failures and HTTP statuses the same way, so
//! the orchestrator sees one vocabulary regardless of upstream.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::errors::MarketDataError;

/// Default per-call timeout for provider HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("financemcp/", env!("CARGO_PKG_VERSION"));

/// Build a client with a bounded timeout.
pub(crate) fn build_client(provider: &str, timeout: Duration) -> Result<Client, MarketDataError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| MarketDataError::fatal(provider, format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport error from `send()` or body reads.
pub(crate) fn classify_send_error(provider: &str, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        MarketDataError::transient(provider, error.without_url().to_string())
    }
}

/// Map a non-success HTTP status.
///
/// | Status | Error |
/// |--------|-------|
/// | 429 | `RateLimited` |
/// | 404 | `SymbolNotFound` |
/// | 401 / 403 | `Fatal` |
/// | 400 / 422 | `InvalidInput` |
/// | 5xx, 408 | `Transient` |
/// | other 4xx | `Fatal` |
pub(crate) fn classify_status(provider: &str, symbol: &str, status: StatusCode) -> MarketDataError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => MarketDataError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        },
        StatusCode::NOT_FOUND => MarketDataError::not_found(provider, symbol),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MarketDataError::fatal(provider, format!("HTTP {} (check API key)", status))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => MarketDataError::InvalidInput(
            format!("{} rejected the request for {} (HTTP {})", provider, symbol, status),
        ),
        StatusCode::REQUEST_TIMEOUT => MarketDataError::transient(provider, format!("HTTP {}", status)),
        s if s.is_server_error() => MarketDataError::transient(provider, format!("HTTP {}", s)),
        s => MarketDataError::fatal(provider, format!("HTTP {}", s)),
    }
}

/// Read the body as text, mapping transport errors.
pub(crate) async fn read_text(provider: &str, response: Response) -> Result<String, MarketDataError> {
    response
        .text()
        .await
        .map_err(|e| classify_send_error(provider, e))
}

/// Deserialize a response body. A malformed payload is retryable.
pub(crate) fn parse_json<T: DeserializeOwned>(
    provider: &str,
    text: &str,
) -> Result<T, MarketDataError> {
    serde_json::from_str(text).map_err(|e| {
        MarketDataError::transient(provider, format!("Failed to parse response: {}", e))
    })
}
