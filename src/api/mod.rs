mod base;
mod control;
pub mod paths;
pub mod state;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub use base::{AboutResponse, HealthResponse};
pub use control::{EstimateResponse, NodeStatus, WeightResponse, WeightUpdate};
pub use state::ControlState;

/// Build the control API over a running coordinator's engine and manager
pub fn api(state: ControlState) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        // Voting read-outs
        .route(paths::control::ESTIMATE, routing::get(control::estimate))
        .route(paths::control::DEVIATION, routing::get(control::deviation))
        .route(paths::control::NODES, routing::get(control::nodes))
        .route(paths::control::CONNECTED, routing::get(control::connected))
        // Weights and fault control
        .route(
            paths::control::WEIGHT,
            routing::get(control::get_weight).put(control::set_weight),
        )
        .route(paths::control::FAULTS, routing::post(control::inject_fault))
        .route(paths::control::RESET, routing::post(control::reset_faults))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
