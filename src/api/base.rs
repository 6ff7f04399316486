use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::state::ControlState;
use crate::cli::{APP_NAME, APP_VERSION};
use crate::error::Result;

pub async fn root() -> &'static str {
    "clockvote coordinator"
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub connected_nodes: usize,
    pub has_estimate: bool,
}

#[instrument(skip(state), level = "debug")]
pub async fn health(State(state): State<ControlState>) -> Result<axum::Json<HealthResponse>> {
    let connected_nodes = state.manager.list_connected_ids().await.len();
    let has_estimate = state.engine.get_estimate()?.is_some();
    Ok(axum::Json(HealthResponse {
        status: "OK".to_string(),
        connected_nodes,
        has_estimate,
    }))
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutResponse {
    name: String,
    version: String,
    node_count: u32,
}

#[instrument(skip(state))]
pub async fn about(State(state): State<ControlState>) -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        node_count: state.engine.config().node_count,
    })
}
