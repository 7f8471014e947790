/// Hint provider for the ask-advice power-up.
pub mod advice;
/// Bot population, naming and answer simulation.
pub mod bots;
/// Outbound message fan-out seam.
pub mod broadcast;
/// Session actor composing the lobby and the game.
pub mod coordinator;
/// Health check service.
pub mod health_service;
/// Lobby queue and countdown.
pub mod lobby;
/// Round lifecycle of the live game.
pub mod orchestrator;
/// Question bank and sampling.
pub mod questions;
#[cfg(test)]
pub(crate) mod testing;
/// Cancellable timers feeding the coordinator.
pub mod timer;
/// WebSocket connection and message handling service.
pub mod websocket_service;
