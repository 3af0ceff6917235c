//! RFC 7662 token introspection for identity providers that issue opaque tokens.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::claims::{DenyReason, TokenClaims};
use super::TokenVerifier;
use crate::config::IntrospectionConfig;

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
    #[serde(flatten)]
    claims: TokenClaims,
}

pub struct IntrospectionVerifier {
    client: Client,
    endpoint: IntrospectionConfig,
    audience: String,
    issuer: Option<String>,
    leeway: Duration,
}

impl IntrospectionVerifier {
    pub fn new(client: Client, endpoint: IntrospectionConfig, audience: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            audience: audience.into(),
            issuer: None,
            leeway: Duration::ZERO,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, DenyReason> {
        let response = self
            .client
            .post(&self.endpoint.url)
            .basic_auth(&self.endpoint.client_id, Some(&self.endpoint.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| {
                warn!("Introspection request failed: {}", e.without_url());
                DenyReason::IntrospectionFailure
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Introspection endpoint answered HTTP {}", status);
            return Err(DenyReason::IntrospectionFailure);
        }

        response.json().await.map_err(|e| {
            warn!("Introspection response could not be parsed: {}", e.without_url());
            DenyReason::IntrospectionFailure
        })
    }
}

#[async_trait]
impl TokenVerifier for IntrospectionVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, DenyReason> {
        let IntrospectionResponse { active, claims } = self.introspect(token).await?;
        let now = Utc::now().timestamp();
        let leeway = self.leeway.as_secs() as i64;

        if !active {
            debug!("Introspection reported an inactive token");
            return Err(if claims.is_expired_at(now, leeway) {
                DenyReason::ExpiredToken
            } else {
                DenyReason::InvalidSignature
            });
        }

        if claims.is_expired_at(now, leeway) {
            return Err(DenyReason::ExpiredToken);
        }

        match &claims.aud {
            Some(aud) if aud.contains(&self.audience) => {}
            _ => return Err(DenyReason::AudienceMismatch),
        }

        // Providers may omit `iss`; only a present, different issuer is rejected.
        if let (Some(expected), Some(actual)) = (&self.issuer, &claims.iss) {
            if expected != actual {
                return Err(DenyReason::InvalidSignature);
            }
        }

        Ok(claims)
    }
}
