/// Game lifecycle payloads.
pub mod game;
/// Health check payloads.
pub mod health;
/// Lobby join and countdown payloads.
pub mod lobby;
/// Shared validation helpers.
pub mod validation;
/// WebSocket message envelopes.
pub mod ws;
