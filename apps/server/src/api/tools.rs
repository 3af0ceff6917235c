use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::Value;
use tracing::info;

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;
use crate::tools::{call_tool, ToolSpec, TOOLS};

async fn list_tools() -> Json<&'static [ToolSpec]> {
    Json(TOOLS)
}

async fn invoke_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    caller: Option<Extension<AuthContext>>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    let client = caller
        .as_ref()
        .and_then(|Extension(context)| context.client_id.as_deref());
    info!(tool = %name, client, "Tool call");

    let args = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Request body is not valid JSON: {}", e)))?
    };

    let result = call_tool(&state.orchestrator, &name, args).await?;
    Ok(Json(result))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(invoke_tool))
}
