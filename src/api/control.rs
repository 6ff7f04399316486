//! Read-outs and controls for dashboards and operators.
use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use super::state::ControlState;
use crate::error::Result;
use crate::node::NodeId;
use crate::protocol::{Request, Response};
use crate::voting::{NodeHealth, SystemEstimate};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResponse {
    pub estimate: Option<SystemEstimate>,
    pub deviation_millis: Option<i64>,
    pub active_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(flatten)]
    pub health: NodeHealth,
    pub last_reported_millis: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightResponse {
    pub node_id: NodeId,
    pub weight: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub weight: f64,
}

#[instrument(skip(state), level = "debug")]
pub async fn estimate(State(state): State<ControlState>) -> Result<Json<EstimateResponse>> {
    Ok(Json(EstimateResponse {
        estimate: state.engine.get_estimate()?,
        deviation_millis: state.engine.get_deviation()?,
        active_count: state.engine.get_active_count()?,
    }))
}

#[instrument(skip(state), level = "debug")]
pub async fn deviation(State(state): State<ControlState>) -> Result<Json<Option<i64>>> {
    Ok(Json(state.engine.get_deviation()?))
}

#[instrument(skip(state), level = "debug")]
pub async fn nodes(State(state): State<ControlState>) -> Result<Json<Vec<NodeStatus>>> {
    let statuses = state
        .engine
        .health_snapshot()?
        .into_iter()
        .map(|health| NodeStatus {
            last_reported_millis: health.last_reported_millis(),
            health,
        })
        .collect();
    Ok(Json(statuses))
}

#[instrument(skip(state), level = "debug")]
pub async fn connected(State(state): State<ControlState>) -> Json<BTreeSet<NodeId>> {
    Json(state.manager.list_connected_ids().await)
}

#[instrument(skip(state), level = "debug")]
pub async fn get_weight(
    Path(node_id): Path<NodeId>,
    State(state): State<ControlState>,
) -> Result<Json<WeightResponse>> {
    let weight = state.engine.node_health(node_id)?.weight;
    Ok(Json(WeightResponse { node_id, weight }))
}

#[instrument(skip(state))]
pub async fn set_weight(
    Path(node_id): Path<NodeId>,
    State(state): State<ControlState>,
    Json(update): Json<WeightUpdate>,
) -> Result<Json<WeightResponse>> {
    state
        .engine
        .set_weight(node_id, update.weight)
        .map_err(|err| {
            event!(Level::WARN, message = "Rejected weight update", err = %err);
            err
        })?;
    Ok(Json(WeightResponse {
        node_id,
        weight: update.weight,
    }))
}

#[instrument(skip(state))]
pub async fn inject_fault(
    Path(node_id): Path<NodeId>,
    State(state): State<ControlState>,
    Json(request): Json<Request>,
) -> Result<Json<Response>> {
    let reply = state.engine.inject_fault(node_id, request).await?;
    Ok(Json(reply.await?))
}

#[instrument(skip(state))]
pub async fn reset_faults(
    Path(node_id): Path<NodeId>,
    State(state): State<ControlState>,
) -> Result<Json<Response>> {
    let reply = state.engine.reset_faults(node_id).await?;
    Ok(Json(reply.await?))
}
