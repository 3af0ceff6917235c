//! OAuth 2.0 protected-resource metadata (RFC 9728), served on the discovery path.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::ResourceConfig;
use crate::main_lib::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
    pub audience: String,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: &ResourceConfig, audience: &str) -> Self {
        Self {
            resource: resource.resource.clone(),
            authorization_servers: resource.authorization_servers.clone(),
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported: resource.scopes_supported.clone(),
            resource_name: resource.resource_name.clone(),
            resource_documentation: resource.documentation.clone(),
            audience: audience.to_string(),
        }
    }
}

pub async fn protected_resource_metadata(
    State(state): State<Arc<AppState>>,
) -> Json<ProtectedResourceMetadata> {
    Json(state.metadata.clone())
}
