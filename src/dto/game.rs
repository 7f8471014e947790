use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::state::game::{GameMode, GameSession, Player, PlayerId, PowerUp, PowerUps, Question};

/// Per-player view broadcast with round results and roster changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSnapshot {
    /// Participant id.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Total score so far.
    pub score: u32,
    /// Whether the player is a bot.
    pub is_bot: bool,
    /// Knocked out of a battle royale.
    pub is_eliminated: bool,
    /// Final placement, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<u32>,
    /// Submitted an answer for the current round.
    pub answered_this_round: bool,
    /// Answered the current round correctly.
    pub answered_correctly: bool,
    /// Power-ups still available.
    pub power_ups: PowerUps,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            username: player.name.clone(),
            score: player.score,
            is_bot: player.is_bot,
            is_eliminated: player.eliminated,
            place: player.place,
            answered_this_round: player.round.answered,
            answered_correctly: player.answered_correctly(),
            power_ups: player.power_ups,
        }
    }
}

/// Snapshot of every player in the session, in join order.
pub fn player_snapshots(session: &GameSession) -> Vec<PlayerSnapshot> {
    session.players.values().map(PlayerSnapshot::from).collect()
}

/// A question served to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewQuestion {
    /// Question text.
    pub question: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// One-based round number.
    pub round_number: usize,
    /// Only known for classic games.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<usize>,
    /// Seconds players have to answer.
    pub duration_secs: u64,
    /// Difficulty of the served question.
    pub difficulty: u8,
    /// Difficulty the round aimed for.
    pub target_difficulty: u8,
    /// Players still in a battle royale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_player_count: Option<usize>,
    /// Battle royale field size at the start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_player_count: Option<usize>,
}

impl NewQuestion {
    /// Payload for the current round of `session`.
    pub fn for_round(
        session: &GameSession,
        question: &Question,
        target_difficulty: u8,
        duration: Duration,
    ) -> Self {
        let battle_royale = session.mode.is_battle_royale();
        Self {
            question: question.text.clone(),
            options: question.options.clone(),
            round_number: session.round_number(),
            total_questions: (!battle_royale).then_some(session.questions.len()),
            duration_secs: duration.as_secs(),
            difficulty: question.difficulty,
            target_difficulty,
            active_player_count: battle_royale.then_some(session.active.len()),
            initial_player_count: battle_royale.then_some(session.initial_player_count),
        }
    }
}

/// Sent to the room when a game is created, and to a reconnecting player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameStarting {
    /// Identifier of the game.
    pub game_id: Uuid,
    /// Mode being played.
    pub mode: GameMode,
    /// Everyone taking part.
    pub players: Vec<PlayerSnapshot>,
    /// Players at game creation, bots included.
    pub initial_player_count: usize,
    /// Sent to a player reconnecting mid-game.
    pub is_rejoin: bool,
    /// Round in progress, for rejoining players.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<NewQuestion>,
    /// Battle royale survivors, for rejoining players.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_player_ids: Option<Vec<PlayerId>>,
}

/// Private acknowledgement of a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerReceipt {
    /// Round the answer was recorded for.
    pub round_number: usize,
    /// Answer as submitted.
    pub answer: String,
}

/// Round results broadcast at reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionResult {
    /// Mode being played.
    pub mode: GameMode,
    /// Round that just closed.
    pub round_number: usize,
    /// Option that scored.
    pub correct_answer: String,
    /// Every player after scoring and eliminations.
    pub players: Vec<PlayerSnapshot>,
    /// Survivors after this round in a battle royale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_player_count: Option<usize>,
}

/// One line of the final standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// Participant id.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Final score.
    pub score: u32,
    /// Whether the player is a bot.
    pub is_bot: bool,
    /// Final placement.
    pub place: Option<u32>,
}

impl From<&Player> for LeaderboardEntry {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            username: player.name.clone(),
            score: player.score,
            is_bot: player.is_bot,
            place: player.place,
        }
    }
}

/// Final standings, sorted by score descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameOver {
    /// Identifier of the finished game.
    pub game_id: Uuid,
    /// Mode that was played.
    pub mode: GameMode,
    /// Standings, best first.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// A human left the running game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerLeft {
    /// Id of the departed player.
    pub id: PlayerId,
    /// Name of the departed player.
    pub username: String,
    /// Players still in the game.
    pub players: Vec<PlayerSnapshot>,
}

/// Told to the rest of the room when someone spends a power-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerUsedPowerUp {
    /// Who used it.
    pub username: String,
    /// Which power-up was used.
    pub kind: PowerUp,
}

/// Private result of a power-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerUpResult {
    /// Power-up that was used.
    pub kind: PowerUp,
    /// Power-ups left afterwards.
    pub remaining: PowerUps,
    /// Remaining options for halve options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Hint text for ask advice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    /// Confirmation for double score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PowerUpResult {
    fn new(kind: PowerUp, remaining: PowerUps) -> Self {
        Self {
            kind,
            remaining,
            options: None,
            advice: None,
            message: None,
        }
    }

    /// Remaining options after two wrong ones were removed.
    pub fn halved(remaining: PowerUps, options: Vec<String>) -> Self {
        Self {
            options: Some(options),
            ..Self::new(PowerUp::HalveOptions, remaining)
        }
    }

    /// Hint from the advice service.
    pub fn advice(remaining: PowerUps, advice: String) -> Self {
        Self {
            advice: Some(advice),
            ..Self::new(PowerUp::AskAdvice, remaining)
        }
    }

    /// Double score is armed for this round.
    pub fn double_armed(remaining: PowerUps) -> Self {
        Self {
            message: Some("Score for this question will be doubled if correct!".into()),
            ..Self::new(PowerUp::DoubleScore, remaining)
        }
    }
}

/// Chat line relayed to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Sender id.
    pub sender_id: PlayerId,
    /// Sender display name.
    pub sender_name: String,
    /// Whether a bot sent it.
    pub is_bot: bool,
    /// Text body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Emoji reaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}
