use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    config::GameConfig,
    dto::validation::validate_username,
    error::ServiceError,
    state::{
        game::{GameMode, PlayerId},
        lobby::LobbyEntry,
    },
};

/// Join-intent sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct JoinLobbyRequest {
    /// Display name.
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    /// Requested mode, classic when omitted.
    #[serde(default)]
    pub mode: Option<String>,
    /// Preferred bot profile.
    #[serde(default)]
    pub bot_difficulty: Option<String>,
}

impl JoinLobbyRequest {
    /// Validate the request and turn it into a lobby entry for `participant`.
    pub fn into_entry(
        self,
        participant: PlayerId,
        config: &GameConfig,
    ) -> Result<LobbyEntry, ServiceError> {
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse::<GameMode>()?,
            None => GameMode::Classic,
        };
        self.validate()?;

        Ok(LobbyEntry {
            id: participant,
            username: self.username.trim().to_string(),
            mode,
            bot_difficulty: config.normalize_bot_difficulty(self.bot_difficulty.as_deref()),
        })
    }
}

/// Lobby member as shown in countdown updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyPlayer {
    /// Participant id.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
}

impl From<&LobbyEntry> for LobbyPlayer {
    fn from(entry: &LobbyEntry) -> Self {
        Self {
            id: entry.id.clone(),
            username: entry.username.clone(),
        }
    }
}

/// Countdown status for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownUpdate {
    /// Mode the update describes.
    pub mode: Option<GameMode>,
    /// Seconds left, or the full wait time when inactive.
    pub seconds_remaining: u64,
    /// Waiting players for that mode.
    pub players: Vec<LobbyPlayer>,
    /// Whether the countdown for that mode is running.
    pub active: bool,
}

/// First message sent on a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionAck {
    /// Id assigned to the connection.
    pub participant_id: PlayerId,
    /// Current countdown status.
    pub lobby: CountdownUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, mode: Option<&str>, bots: Option<&str>) -> JoinLobbyRequest {
        JoinLobbyRequest {
            username: username.into(),
            mode: mode.map(str::to_string),
            bot_difficulty: bots.map(str::to_string),
        }
    }

    #[test]
    fn defaults_to_classic_and_default_profile() {
        let config = GameConfig::default();
        let entry = request(" ada ", None, Some("nightmare"))
            .into_entry("p1".into(), &config)
            .unwrap();

        assert_eq!(entry.mode, GameMode::Classic);
        assert_eq!(entry.username, "ada");
        assert_eq!(entry.bot_difficulty, "easy");
    }

    #[test]
    fn invalid_mode_is_rejected_first() {
        let config = GameConfig::default();
        let err = request("", Some("tag_team"), None)
            .into_entry("p1".into(), &config)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid game mode.");
    }

    #[test]
    fn blank_name_is_rejected() {
        let config = GameConfig::default();
        let err = request("  ", Some("battle_royale"), None)
            .into_entry("p1".into(), &config)
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("Username cannot be empty.".into()));
    }
}
