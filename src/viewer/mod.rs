// Live viewer connections over WebSocket

pub mod connection;
pub mod hub;
pub mod protocol;

pub use connection::{create_viewer_router, serve_viewer};
pub use hub::{BroadcastOutcome, ViewerHub};
pub use protocol::{encode_frame, LiveFrame};
