/// Players, questions and the live session.
pub mod game;
/// Connection and room registry.
pub mod hub;
/// Lobby queue and countdown records.
pub mod lobby;
/// Round phase state machine.
pub mod state_machine;

use std::sync::Arc;

use crate::{config::GameConfig, services::coordinator::SessionHandle};

use self::hub::RoomHub;

/// Handle to the application state shared by handlers.
pub type SharedState = Arc<AppState>;

/// Central application state shared with every request handler.
///
/// Session state itself lives inside the coordinator task; handlers only hold
/// its mailbox and the connection hub.
pub struct AppState {
    config: Arc<GameConfig>,
    hub: Arc<RoomHub>,
    session: SessionHandle,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: Arc<GameConfig>, hub: Arc<RoomHub>, session: SessionHandle) -> SharedState {
        Arc::new(Self {
            config,
            hub,
            session,
        })
    }

    /// Access the immutable game configuration.
    pub fn config(&self) -> Arc<GameConfig> {
        Arc::clone(&self.config)
    }

    /// Registry of open player sockets and game rooms.
    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Mailbox of the session coordinator.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}
