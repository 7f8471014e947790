use serde::{Deserialize, Serialize};

use crate::dto::{
    game::{
        AnswerReceipt, ChatMessage, GameOver, GameStarting, NewQuestion, PlayerLeft,
        PlayerUsedPowerUp, PowerUpResult, QuestionResult,
    },
    lobby::{ConnectionAck, CountdownUpdate, JoinLobbyRequest},
};

/// Messages accepted from player WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Queue for a mode, or rejoin the running game.
    JoinLobby(JoinLobbyRequest),
    /// Answer the open question.
    SubmitAnswer {
        /// Chosen option.
        answer: String,
    },
    /// Spend a power-up.
    UsePowerUp {
        /// Power-up name.
        #[serde(alias = "help_type")]
        kind: String,
    },
    /// Chat with the room.
    Chat {
        /// Text line.
        #[serde(default)]
        message: Option<String>,
        /// Emoji reaction.
        #[serde(default)]
        emoji: Option<String>,
    },
    /// Anything else.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Messages pushed to player WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted.
    ConnectionAck(ConnectionAck),
    /// Lobby countdown status.
    CountdownUpdate(CountdownUpdate),
    /// Game created, or rejoin snapshot.
    GameStarting(GameStarting),
    /// Question opened.
    NewQuestion(NewQuestion),
    /// Answer accepted.
    AnswerReceipt(AnswerReceipt),
    /// Round results.
    QuestionResult(QuestionResult),
    /// Final standings.
    GameOver(GameOver),
    /// A human left the game.
    PlayerLeft(PlayerLeft),
    /// Someone spent a power-up.
    PlayerUsedPowerUp(PlayerUsedPowerUp),
    /// Private power-up outcome.
    PowerUpResult(PowerUpResult),
    /// Chat line.
    ChatMessage(ChatMessage),
    /// Rejected action.
    Error {
        /// Human readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionAck(_) => "connection_ack",
            ServerMessage::CountdownUpdate(_) => "countdown_update",
            ServerMessage::GameStarting(_) => "game_starting",
            ServerMessage::NewQuestion(_) => "new_question",
            ServerMessage::AnswerReceipt(_) => "answer_receipt",
            ServerMessage::QuestionResult(_) => "question_result",
            ServerMessage::GameOver(_) => "game_over",
            ServerMessage::PlayerLeft(_) => "player_left",
            ServerMessage::PlayerUsedPowerUp(_) => "player_used_power_up",
            ServerMessage::PowerUpResult(_) => "power_up_result",
            ServerMessage::ChatMessage(_) => "chat_message",
            ServerMessage::Error { .. } => "error",
        }
    }
}
