use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request was refused. The code is part of the 401 body and is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed bearer token")]
    MalformedToken,
    #[error("token signature could not be verified")]
    InvalidSignature,
    #[error("token has expired")]
    ExpiredToken,
    #[error("token audience does not match this resource")]
    AudienceMismatch,
    #[error("identity provider could not be reached")]
    IntrospectionFailure,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MalformedToken => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
            Self::AudienceMismatch => "audience_mismatch",
            Self::IntrospectionFailure => "introspection_failure",
        }
    }
}

/// `aud` is either a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims the gate cares about, from a verified JWT or an introspection response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl TokenClaims {
    pub fn is_expired_at(&self, unix_now: i64, leeway_secs: i64) -> bool {
        self.exp.is_some_and(|exp| exp.saturating_add(leeway_secs) < unix_now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_forms() {
        let one: TokenClaims = serde_json::from_str(r#"{"aud":"financemcp"}"#).unwrap();
        let many: TokenClaims = serde_json::from_str(r#"{"aud":["other","financemcp"]}"#).unwrap();
        assert!(one.aud.unwrap().contains("financemcp"));
        assert!(many.aud.unwrap().contains("financemcp"));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(DenyReason::MissingToken.code(), "missing_token");
        assert_eq!(DenyReason::IntrospectionFailure.code(), "introspection_failure");
    }

    #[test]
    fn test_expiry_with_leeway() {
        let claims = TokenClaims {
            exp: Some(1_000),
            ..Default::default()
        };
        assert!(claims.is_expired_at(1_001, 0));
        assert!(!claims.is_expired_at(1_001, 5));
        assert!(!TokenClaims::default().is_expired_at(i64::MAX, 0));
    }

    #[test]
    fn test_far_future_expiry_does_not_overflow() {
        let claims = TokenClaims {
            exp: Some(i64::MAX - 1),
            ..Default::default()
        };
        assert!(!claims.is_expired_at(1_700_000_000, 60));
    }
}
