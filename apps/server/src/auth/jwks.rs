//! Local JWT verification against the identity provider's published key set.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use financemcp_market_data::{Clock, SystemClock};
use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::claims::{DenyReason, TokenClaims};
use super::TokenVerifier;

#[derive(Default)]
struct KeySet {
    keys: Vec<(Option<String>, DecodingKey)>,
    /// Last fetch attempt, successful or not.
    checked_at: Option<Instant>,
}

impl KeySet {
    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.checked_at
            .map_or(true, |at| now.saturating_duration_since(at) >= max_age)
    }

    fn find(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|(key_id, _)| key_id.as_deref() == Some(kid))
                .map(|(_, key)| key.clone()),
            // A token without `kid` is only acceptable against a single-key set.
            None if self.keys.len() == 1 => self.keys.first().map(|(_, key)| key.clone()),
            None => None,
        }
    }
}

pub struct JwksVerifier {
    client: Client,
    jwks_uri: String,
    audience: String,
    issuer: Option<String>,
    algorithms: Vec<Algorithm>,
    leeway: Duration,
    refresh_interval: Duration,
    keys: RwLock<KeySet>,
    clock: Arc<dyn Clock>,
}

impl JwksVerifier {
    pub fn new(
        client: Client,
        jwks_uri: impl Into<String>,
        audience: impl Into<String>,
        algorithms: Vec<Algorithm>,
    ) -> Self {
        Self {
            client,
            jwks_uri: jwks_uri.into(),
            audience: audience.into(),
            issuer: None,
            algorithms,
            leeway: Duration::ZERO,
            refresh_interval: Duration::from_secs(300),
            keys: RwLock::new(KeySet::default()),
            clock: Arc::new(SystemClock),
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

    /// Maximum age of the cached key set. Older sets are refetched before
    /// use, and an unknown `kid` triggers at most one fetch per interval.
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn read_keys(&self) -> RwLockReadGuard<'_, KeySet> {
        self.keys.read().unwrap_or_else(|poisoned| {
            warn!("JWKS lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, KeySet> {
        self.keys.write().unwrap_or_else(|poisoned| {
            warn!("JWKS lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Resolve the verification key.
    ///
    /// A fresh set is used as is. A stale set is refetched first so withdrawn
    /// keys stop verifying; if that fetch fails the stale set keeps serving
    /// until the next interval.
    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, DenyReason> {
        let now = self.clock.now();
        let (cached, stale) = {
            let keys = self.read_keys();
            (keys.find(kid), keys.is_stale(now, self.refresh_interval))
        };

        match (cached, stale) {
            (Some(key), false) => Ok(key),
            (None, false) => {
                debug!("Unknown signing key {:?}, refresh not yet due", kid);
                Err(DenyReason::InvalidSignature)
            }
            (Some(key), true) => match self.refresh().await {
                Ok(()) => self.read_keys().find(kid).ok_or(DenyReason::InvalidSignature),
                Err(_) => {
                    warn!("Keeping stale JWKS after failed refresh");
                    self.write_keys().checked_at = Some(now);
                    Ok(key)
                }
            },
            (None, true) => {
                self.refresh().await?;
                self.read_keys().find(kid).ok_or(DenyReason::InvalidSignature)
            }
        }
    }

    async fn refresh(&self) -> Result<(), DenyReason> {
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                warn!("JWKS fetch failed: {}", e.without_url());
                DenyReason::IntrospectionFailure
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("JWKS endpoint answered HTTP {}", status);
            return Err(DenyReason::IntrospectionFailure);
        }

        let set: JwkSet = response.json().await.map_err(|e| {
            warn!("JWKS response could not be parsed: {}", e.without_url());
            DenyReason::IntrospectionFailure
        })?;

        let keys: Vec<_> = set
            .keys
            .iter()
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((jwk.common.key_id.clone(), key)),
                Err(e) => {
                    warn!("Skipping unusable JWK {:?}: {}", jwk.common.key_id, e);
                    None
                }
            })
            .collect();

        info!("Loaded {} signing keys from JWKS", keys.len());
        *self.write_keys() = KeySet {
            keys,
            checked_at: Some(self.clock.now()),
        };
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, DenyReason> {
        let header = decode_header(token).map_err(|_| DenyReason::MalformedToken)?;
        if !self.algorithms.contains(&header.alg) {
            debug!("Rejecting token signed with {:?}", header.alg);
            return Err(DenyReason::InvalidSignature);
        }

        let key = self.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.audience.as_str()]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        validation.leeway = self.leeway.as_secs();

        decode::<TokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| classify_jwt_error(e.kind()))
    }
}

fn classify_jwt_error(kind: &ErrorKind) -> DenyReason {
    match kind {
        ErrorKind::ExpiredSignature => DenyReason::ExpiredToken,
        ErrorKind::InvalidAudience => DenyReason::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => DenyReason::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => DenyReason::MalformedToken,
        _ => DenyReason::InvalidSignature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_jwt_error(&ErrorKind::ExpiredSignature), DenyReason::ExpiredToken);
        assert_eq!(classify_jwt_error(&ErrorKind::InvalidAudience), DenyReason::AudienceMismatch);
        assert_eq!(
            classify_jwt_error(&ErrorKind::MissingRequiredClaim("aud".to_string())),
            DenyReason::AudienceMismatch
        );
        assert_eq!(
            classify_jwt_error(&ErrorKind::MissingRequiredClaim("exp".to_string())),
            DenyReason::MalformedToken
        );
        assert_eq!(classify_jwt_error(&ErrorKind::InvalidSignature), DenyReason::InvalidSignature);
        assert_eq!(classify_jwt_error(&ErrorKind::InvalidIssuer), DenyReason::InvalidSignature);
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed_without_fetch() {
        let verifier = JwksVerifier::new(
            Client::new(),
            "http://127.0.0.1:9/keys",
            "financemcp",
            vec![Algorithm::EdDSA],
        );
        assert_eq!(verifier.verify("not-a-jwt").await, Err(DenyReason::MalformedToken));
    }
}
