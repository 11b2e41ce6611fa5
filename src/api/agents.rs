use super::{accepted, ApiState, AppError};
use crate::error::BridgeError;
use crate::event::{Vec3, Waypoint};
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Body of POST /api/agents/:id/state
#[derive(Deserialize)]
pub struct StateRequest {
    pub position: Vec3,
    pub velocity: Option<Vec3>,
    pub attitude: Option<Vec3>,
}

pub fn create_agents_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/agents", get(list_agents))
        .route("/api/agents/:id", get(get_agent))
        .route("/api/agents/:id/state", post(post_state))
        .route("/api/agents/:id/mission", get(get_mission).put(put_mission))
        .with_state(state)
}

/// GET /api/agents - latest published snapshot
async fn list_agents(State(state): State<Arc<ApiState>>) -> Response {
    let snapshot = state.bridge.agent_states();
    Json(snapshot.as_ref()).into_response()
}

/// GET /api/agents/:id
async fn get_agent(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let snapshot = state.bridge.agent_states();
    let agent = snapshot
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("agent '{}' not found", id)))?;
    Ok(Json(agent).into_response())
}

/// POST /api/agents/:id/state - enqueue a position update
async fn post_state(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: StateRequest = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::malformed(format!("invalid state body: {}", e)))?;

    let seq = state.bridge.add_or_update_agent_state(
        &id,
        request.position,
        request.velocity,
        request.attitude,
    )?;
    Ok(accepted(seq))
}

/// PUT /api/agents/:id/mission - replace the mission
async fn put_mission(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let waypoints: Vec<Waypoint> = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::malformed(format!("invalid waypoint list: {}", e)))?;

    let seq = state.bridge.set_mission(&id, waypoints)?;
    Ok(accepted(seq))
}

/// GET /api/agents/:id/mission
async fn get_mission(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let mission = state
        .bridge
        .get_mission(&id)
        .ok_or_else(|| AppError::NotFound(format!("no mission for agent '{}'", id)))?;
    Ok(Json(mission.as_ref()).into_response())
}
