use thiserror::Error;
use validator::ValidationErrors;

use crate::state::state_machine::InvalidTransition;

/// Errors returned by session operations; the display text is sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("{0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("{0}")]
    InvalidState(String),
    /// The participant is not part of the running game.
    #[error("Not in game.")]
    NotInGame,
    /// The power-up is unknown, already spent, or not usable by this participant.
    #[error("Cannot use power-up {0}.")]
    PowerUpUnavailable(String),
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .find_map(|error| error.message.as_ref().map(|message| message.to_string()))
            .unwrap_or_else(|| format!("validation failed: {err}"));
        ServiceError::InvalidInput(message)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}
