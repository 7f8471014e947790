use serde::Serialize;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// A lobby countdown is running.
    pub lobby_active: bool,
    /// A game is running.
    pub game_active: bool,
    /// Open player connections.
    pub connections: usize,
}

impl HealthResponse {
    /// Create a health response indicating the session coordinator is running.
    pub fn ok(lobby_active: bool, game_active: bool, connections: usize) -> Self {
        Self {
            status: "ok".to_string(),
            lobby_active,
            game_active,
            connections,
        }
    }

    /// Create a health response indicating the session coordinator stopped.
    pub fn degraded(connections: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            lobby_active: false,
            game_active: false,
            connections,
        }
    }
}
