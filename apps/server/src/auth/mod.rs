//! Bearer-token gate in front of every route except discovery.
//!
//! ```text
//!   discovery path ─────────────────────────────► Allowed(None)
//!   Authorization header ─► extract ─► decision cache ─hit─► Allowed(claims)
//!                                          │ miss
//!                                          ▼
//!                                   TokenVerifier (JWKS | introspection)
//! ```
//!
//! Only allowed decisions are cached. Denials answer 401 with a reason code
//! and a `WWW-Authenticate` challenge pointing at the resource metadata.

mod claims;
mod decision_cache;
mod introspection;
mod jwks;
mod metadata;
mod token;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header::WWW_AUTHENTICATE, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, Span};

pub use claims::{Audience, DenyReason, TokenClaims};
pub use decision_cache::DecisionCache;
pub use introspection::IntrospectionVerifier;
pub use jwks::JwksVerifier;
pub use metadata::{protected_resource_metadata, ProtectedResourceMetadata};
pub use token::extract_bearer;

use crate::config::{AuthConfig, DISCOVERY_PATH};

/// Checks a bearer token with the identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims, DenyReason>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// `None` for discovery requests, which carry no identity.
    Allowed(Option<TokenClaims>),
    Denied(DenyReason),
}

/// Caller identity attached to request extensions. Used for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub subject: Option<String>,
    pub client_id: Option<String>,
}

impl From<&TokenClaims> for AuthContext {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            client_id: claims.client_id.clone(),
        }
    }
}

pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    cache: DecisionCache,
    metadata_url: String,
}

impl AuthGate {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        cache: DecisionCache,
        metadata_url: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            cache,
            metadata_url: metadata_url.into(),
        }
    }

    /// Introspection when an endpoint is configured, local JWKS validation otherwise.
    pub fn from_config(client: Client, auth: &AuthConfig, metadata_url: impl Into<String>) -> Self {
        let verifier: Arc<dyn TokenVerifier> = match &auth.introspection {
            Some(endpoint) => Arc::new(
                IntrospectionVerifier::new(client, endpoint.clone(), auth.audience.clone())
                    .with_issuer(auth.issuer.clone())
                    .with_leeway(auth.leeway),
            ),
            None => Arc::new(
                JwksVerifier::new(
                    client,
                    auth.jwks_uri.clone(),
                    auth.audience.clone(),
                    auth.algorithms.clone(),
                )
                .with_issuer(auth.issuer.clone())
                .with_leeway(auth.leeway)
                .with_refresh_interval(auth.jwks_refresh_interval),
            ),
        };
        Self::new(
            verifier,
            DecisionCache::new(auth.decision_cache_window),
            metadata_url,
        )
    }

    pub fn metadata_url(&self) -> &str {
        &self.metadata_url
    }

    pub fn decision_cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Decide whether a request may proceed.
    ///
    /// Takes the request's path and headers rather than the request so the
    /// returned future does not borrow the (non-`Sync`) body.
    pub async fn authorize(&self, path: &str, headers: &HeaderMap) -> AuthDecision {
        if path == DISCOVERY_PATH {
            return AuthDecision::Allowed(None);
        }

        let token = match extract_bearer(headers) {
            Ok(token) => token,
            Err(reason) => return AuthDecision::Denied(reason),
        };

        if let Some(claims) = self.cache.get(token) {
            return AuthDecision::Allowed(Some(claims));
        }

        match self.verifier.verify(token).await {
            Ok(claims) => {
                self.cache
                    .insert(token, claims.clone(), Utc::now().timestamp());
                AuthDecision::Allowed(Some(claims))
            }
            Err(reason) => AuthDecision::Denied(reason),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

#[derive(Serialize)]
struct DeniedBody {
    code: u16,
    reason: &'static str,
    message: String,
}

/// A denied request, rendered as a 401 challenge.
#[derive(Debug)]
pub struct AuthRejection {
    reason: DenyReason,
    metadata_url: String,
}

impl AuthRejection {
    pub fn reason(&self) -> DenyReason {
        self.reason
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let body = Json(DeniedBody {
            code: status.as_u16(),
            reason: self.reason.code(),
            message: self.reason.to_string(),
        });
        let challenge = format!(
            "Bearer error=\"invalid_token\", resource_metadata=\"{}\"",
            self.metadata_url
        );

        let mut response = (status, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

pub async fn require_bearer(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let decision = gate
        .authorize(request.uri().path(), request.headers())
        .await;

    match decision {
        AuthDecision::Allowed(Some(claims)) => {
            let context = AuthContext::from(&claims);
            if let Some(subject) = &context.subject {
                Span::current().record("subject", subject.as_str());
            }
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        AuthDecision::Allowed(None) => Ok(next.run(request).await),
        AuthDecision::Denied(reason) => {
            debug!(reason = reason.code(), "Request denied");
            Err(AuthRejection {
                reason,
                metadata_url: gate.metadata_url.clone(),
            })
        }
    }
}
