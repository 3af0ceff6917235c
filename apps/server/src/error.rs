use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use financemcp_market_data::MarketDataError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    MarketData(#[from] MarketDataError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    reason: &'static str,
    message: String,
}

impl ApiError {
    /// HTTP status and stable reason code.
    pub fn status_and_reason(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::UnknownTool(_) => (StatusCode::NOT_FOUND, "unknown_tool"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::MarketData(e) => match e {
                MarketDataError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                MarketDataError::NotSupported { .. } => {
                    (StatusCode::BAD_REQUEST, "unsupported_operation")
                }
                MarketDataError::NoDataAvailable { .. }
                | MarketDataError::NoProvidersAvailable
                | MarketDataError::SymbolNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "no_data_available")
                }
                MarketDataError::Fatal { .. } => (StatusCode::BAD_GATEWAY, "provider_unavailable"),
                MarketDataError::RateLimited { .. }
                | MarketDataError::Timeout { .. }
                | MarketDataError::Transient { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
                }
            },
        }
    }

    /// User-facing text. Upstream causes stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::UnknownTool(_) => self.to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::MarketData(e) => match e {
                MarketDataError::InvalidInput(msg) => msg.clone(),
                MarketDataError::NotSupported { operation, .. } => {
                    format!("Operation '{}' is not supported", operation)
                }
                MarketDataError::NoDataAvailable { .. }
                | MarketDataError::NoProvidersAvailable
                | MarketDataError::SymbolNotFound { .. } => {
                    "No data available for this request".to_string()
                }
                MarketDataError::Fatal { .. } => "Data provider is unavailable".to_string(),
                MarketDataError::RateLimited { .. }
                | MarketDataError::Timeout { .. }
                | MarketDataError::Transient { .. } => {
                    "Data providers are temporarily unavailable".to_string()
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = self.status_and_reason();
        if status.is_server_error() {
            error!(reason, "Request failed: {}", self);
        } else {
            warn!(reason, "Request rejected: {}", self);
        }

        let body = Json(ErrorBody {
            code: status.as_u16(),
            reason,
            message: self.public_message(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use financemcp_market_data::FetchDiagnostics;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), 400, "invalid_request"),
            (ApiError::UnknownTool("x".into()), 404, "unknown_tool"),
            (
                MarketDataError::NoDataAvailable {
                    diagnostics: FetchDiagnostics::new(),
                }
                .into(),
                404,
                "no_data_available",
            ),
            (MarketDataError::NoProvidersAvailable.into(), 404, "no_data_available"),
            (
                MarketDataError::Fatal {
                    provider: "FRED".into(),
                    cause: "invalid api_key".into(),
                }
                .into(),
                502,
                "provider_unavailable",
            ),
            (
                MarketDataError::Timeout {
                    provider: "YAHOO".into(),
                }
                .into(),
                503,
                "upstream_unavailable",
            ),
            (ApiError::Internal("boom".into()), 500, "internal_error"),
        ];

        for (error, status, reason) in cases {
            let (actual_status, actual_reason) = error.status_and_reason();
            assert_eq!(actual_status.as_u16(), status, "{}", error);
            assert_eq!(actual_reason, reason);
        }
    }

    #[test]
    fn test_upstream_detail_is_not_exposed() {
        let error = ApiError::from(MarketDataError::Fatal {
            provider: "FRED".into(),
            cause: "api_key=secret rejected".into(),
        });
        assert!(!error.public_message().contains("secret"));
    }
}
