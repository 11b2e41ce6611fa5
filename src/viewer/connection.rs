use crate::viewer::ViewerHub;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Router serving `GET /api/ws`
pub fn create_viewer_router(hub: Arc<ViewerHub>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(hub)
}

/// GET /api/ws - WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<ViewerHub>>) -> Response {
    info!("Viewer upgrade request received");
    ws.on_upgrade(|socket| serve_viewer(socket, hub))
}

/// Pump frames from the hub to one viewer until either side goes away.
///
/// The viewer is unregistered on every exit path.
pub async fn serve_viewer(mut socket: WebSocket, hub: Arc<ViewerHub>) {
    let (id, mut frames) = hub.register();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(viewer = %id, "Viewer disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!(viewer = %id, error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(viewer = %id, len = text.len(), "Ignoring viewer message");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(viewer = %id, error = %e, "Viewer socket error");
                        break;
                    }
                }
            }

            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                            warn!(viewer = %id, error = %e, "Failed to send frame to viewer");
                            break;
                        }
                    }
                    // Hub dropped this viewer (shutdown)
                    None => break,
                }
            }
        }
    }

    hub.unregister(&id);
}
