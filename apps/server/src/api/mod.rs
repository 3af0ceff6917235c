pub mod status;
pub mod tools;

use std::sync::Arc;

use axum::{body::Body, http::Request, middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info_span, warn};

use crate::auth::{protected_resource_metadata, require_bearer};
use crate::config::{Config, DISCOVERY_PATH};
use crate::main_lib::AppState;

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };

    let api = Router::new().merge(tools::router()).merge(status::router());

    // The gate wraps every route and lets the discovery path through itself.
    Router::new()
        .route(DISCOVERY_PATH, get(protected_resource_metadata))
        .nest("/api/v1", api)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_bearer,
        ))
        .layer(cors)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id,
                    subject = tracing::field::Empty,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
