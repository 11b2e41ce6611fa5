// Hosting HTTP API

mod agents;
mod control;

pub use agents::create_agents_router;
pub use control::create_control_router;

use crate::bridge::Bridge;
use crate::error::BridgeError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for every API route
pub struct ApiState {
    pub bridge: Arc<Bridge>,
}

/// Full API router with permissive CORS
pub fn create_router(bridge: Arc<Bridge>) -> Router {
    let state = Arc::new(ApiState { bridge });
    Router::new()
        .merge(create_agents_router(state.clone()))
        .merge(create_control_router(state))
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Body of every 202 response
#[derive(Serialize)]
struct Accepted {
    seq: u64,
}

fn accepted(seq: u64) -> Response {
    (StatusCode::ACCEPTED, Json(Accepted { seq })).into_response()
}

/// API error types
enum AppError {
    Bridge(BridgeError),
    NotFound(String),
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        AppError::Bridge(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Bridge(e) => {
                let status = match &e {
                    BridgeError::MalformedUpdate(_) => StatusCode::BAD_REQUEST,
                    BridgeError::Overflow { .. } | BridgeError::Lifecycle(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    BridgeError::Connectivity { .. } => StatusCode::BAD_GATEWAY,
                    BridgeError::CollaboratorTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };

        let mut resp = (status, Json(ErrorResponse { error: message })).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        resp
    }
}
