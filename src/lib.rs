//! Library crate for trivia-royale-back, exposing modules for the binary and integration tests.

/// Game tuning loaded at startup.
pub mod config;
/// Wire payloads.
pub mod dto;
/// Service error types.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Game logic and supporting services.
pub mod services;
/// Shared application state.
pub mod state;
