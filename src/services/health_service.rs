use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the session coordinator answers, with lobby and game activity.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let connections = state.hub().connection_count();
    match state.session().snapshot().await {
        Some(snapshot) => HealthResponse::ok(
            snapshot.lobby.active,
            snapshot.game.is_some(),
            connections,
        ),
        None => {
            warn!("session coordinator is not running (degraded mode)");
            HealthResponse::degraded(connections)
        }
    }
}
