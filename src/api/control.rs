use super::{accepted, ApiState, AppError};
use crate::event::Command;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::debug;

pub fn create_control_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/commands", post(post_command))
        .route("/api/stats", get(get_stats))
        .with_state(state)
}

/// POST /api/commands - `{type, parameters}`
async fn post_command(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let command = Command::from_json(&body).map_err(crate::error::BridgeError::from)?;
    debug!(kind = %command.kind(), "Command received over HTTP");
    let seq = state.bridge.submit_command(command)?;
    Ok(accepted(seq))
}

/// GET /api/stats
async fn get_stats(State(state): State<Arc<ApiState>>) -> Response {
    Json(state.bridge.stats()).into_response()
}
