use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub providers: Vec<&'static str>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(ServerStatus {
        name: state.server_name.clone(),
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        providers: state.orchestrator.provider_ids(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}
