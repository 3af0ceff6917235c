//! Bearer token extraction.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::claims::DenyReason;

/// Pull the bearer token out of the `Authorization` header.
///
/// Only the header is inspected; nothing here talks to the identity provider.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, DenyReason> {
    let value = headers.get(AUTHORIZATION).ok_or(DenyReason::MissingToken)?;
    let header = value.to_str().map_err(|_| DenyReason::MalformedToken)?;

    let mut parts = header.splitn(2, ' ');
    let (Some(scheme), Some(token)) = (parts.next(), parts.next()) else {
        return Err(DenyReason::MalformedToken);
    };

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(DenyReason::MalformedToken);
    }

    let token = token.trim();
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(DenyReason::MalformedToken);
    }

    Ok(token)
}
