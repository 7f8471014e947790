use axum::Router;

use crate::state::SharedState;

/// Health check route.
pub mod health;
/// WebSocket upgrade route.
pub mod websocket;

/// Compose all route trees and wire in shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(websocket::router())
        .with_state(state)
}
