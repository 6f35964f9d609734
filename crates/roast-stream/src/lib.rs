#![doc = "Live streaming endpoint for the roast gateway: a WebSocket route that fans out temperature, state, and control-acknowledgement frames per connected machine."]

mod websocket;

pub use websocket::live_handler;

use axum::routing::get;
use axum::{Extension, Router};
use roast_manager::MachineManager;
use std::sync::Arc;

/// Build the live-streaming router. The manager is received as an explicit
/// handle here rather than held in a module-level global, so a process can
/// run more than one gateway instance side by side if it ever needs to.
#[must_use]
pub fn router(manager: Arc<MachineManager>) -> Router {
    Router::new()
        .route("/live/:machine_id", get(websocket::live_handler))
        .layer(Extension(manager))
}
