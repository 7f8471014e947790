use std::{fmt, str::FromStr};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{error::ServiceError, services::timer::TimerHandle};

/// Identifier of a participant: the socket id for humans, `bot_<uuid>` for bots.
pub type PlayerId = String;

/// Lowest adaptive difficulty level.
pub const MIN_DIFFICULTY: u8 = 1;
/// Highest adaptive difficulty level.
pub const MAX_DIFFICULTY: u8 = 10;
/// Level stored on a fresh classic session (its first round is still played at level 1).
pub const CLASSIC_START_DIFFICULTY: u8 = 5;
/// Level a battle royale session starts at.
pub const BATTLE_ROYALE_START_DIFFICULTY: u8 = 1;

/// Game modes a lobby can count down for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Fixed number of rounds; highest score wins.
    Classic,
    /// Missing or wrong answers eliminate; last player standing wins.
    BattleRoyale,
}

impl GameMode {
    /// Order in which waiting lobbies are resumed once the server goes idle.
    pub const PRIORITY: [GameMode; 2] = [GameMode::Classic, GameMode::BattleRoyale];

    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::BattleRoyale => "battle_royale",
        }
    }

    /// Whether eliminations apply.
    pub fn is_battle_royale(self) -> bool {
        matches!(self, GameMode::BattleRoyale)
    }

    /// Adaptive difficulty a new session of this mode starts with.
    pub fn start_difficulty(self) -> u8 {
        match self {
            GameMode::Classic => CLASSIC_START_DIFFICULTY,
            GameMode::BattleRoyale => BATTLE_ROYALE_START_DIFFICULTY,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(GameMode::Classic),
            "battle_royale" | "battle-royale" | "battleroyale" => Ok(GameMode::BattleRoyale),
            _ => Err(ServiceError::InvalidInput("Invalid game mode.".into())),
        }
    }
}

/// A multiple-choice question as served to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    /// Question text.
    pub text: String,
    /// Answer options, already shuffled.
    pub options: Vec<String>,
    /// The option that scores.
    pub correct_answer: String,
    /// Difficulty level (1-10) of the question record.
    pub difficulty: u8,
}

impl Question {
    /// Options that do not match the correct answer.
    pub fn wrong_options(&self) -> Vec<&String> {
        self.options
            .iter()
            .filter(|option| **option != self.correct_answer)
            .collect()
    }

    /// Whether `answer` is the scoring option.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer == self.correct_answer
    }
}

/// Single-use abilities every human starts a game with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUp {
    /// Remove two wrong options.
    HalveOptions,
    /// Ask the advice service for a hint.
    AskAdvice,
    /// Double the points of a correct answer this round.
    DoubleScore,
}

impl PowerUp {
    /// Wire name of the power-up.
    pub fn as_str(self) -> &'static str {
        match self {
            PowerUp::HalveOptions => "halve_options",
            PowerUp::AskAdvice => "ask_advice",
            PowerUp::DoubleScore => "double_score",
        }
    }
}

impl fmt::Display for PowerUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerUp {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "halve_options" | "fifty_fifty" => Ok(PowerUp::HalveOptions),
            "ask_advice" | "call_friend" => Ok(PowerUp::AskAdvice),
            "double_score" => Ok(PowerUp::DoubleScore),
            other => Err(ServiceError::PowerUpUnavailable(other.to_string())),
        }
    }
}

/// Remaining power-ups of a player; `true` means still available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerUps {
    /// Remove two wrong options.
    pub halve_options: bool,
    /// Ask for a hint.
    pub ask_advice: bool,
    /// Double this round's points.
    pub double_score: bool,
}

impl Default for PowerUps {
    fn default() -> Self {
        Self {
            halve_options: true,
            ask_advice: true,
            double_score: true,
        }
    }
}

impl PowerUps {
    /// Whether `kind` has not been used yet.
    pub fn is_available(&self, kind: PowerUp) -> bool {
        match kind {
            PowerUp::HalveOptions => self.halve_options,
            PowerUp::AskAdvice => self.ask_advice,
            PowerUp::DoubleScore => self.double_score,
        }
    }

    /// Mark `kind` as used, returning whether it was still available.
    pub fn consume(&mut self, kind: PowerUp) -> bool {
        let slot = match kind {
            PowerUp::HalveOptions => &mut self.halve_options,
            PowerUp::AskAdvice => &mut self.ask_advice,
            PowerUp::DoubleScore => &mut self.double_score,
        };
        std::mem::replace(slot, false)
    }
}

/// Transient per-round state, reset wholesale when a round opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundState {
    /// Submitted an answer this round.
    pub answered: bool,
    /// That answer was correct.
    pub correct: bool,
    /// Points earned this round, credited to the score at reveal time.
    pub pending_points: u32,
    /// Double-score power-up armed for this round.
    pub double_armed: bool,
}

/// Player info tracked during a game session.
#[derive(Debug, Clone)]
pub struct Player {
    /// Participant id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Whether the player is a bot.
    pub is_bot: bool,
    /// Never decreases during a game.
    pub score: u32,
    /// Power-ups still available.
    pub power_ups: PowerUps,
    /// Knocked out of a battle royale.
    pub eliminated: bool,
    /// Final placement, set on elimination or at the end of the game.
    pub place: Option<u32>,
    /// Outcome of the last revealed round, used by the classic difficulty policy.
    pub last_round_correct: Option<bool>,
    /// Transient state of the current round.
    pub round: RoundState,
}

impl Player {
    /// A human player with a full set of power-ups.
    pub fn human(id: PlayerId, name: String) -> Self {
        Self::new(id, name, false)
    }

    /// A bot player.
    pub fn bot(id: PlayerId, name: String) -> Self {
        Self::new(id, name, true)
    }

    fn new(id: PlayerId, name: String, is_bot: bool) -> Self {
        Self {
            id,
            name,
            is_bot,
            score: 0,
            power_ups: PowerUps::default(),
            eliminated: false,
            place: None,
            last_round_correct: None,
            round: RoundState::default(),
        }
    }

    /// Did this player answer the current round correctly.
    pub fn answered_correctly(&self) -> bool {
        self.round.answered && self.round.correct
    }
}

/// The single live game.
#[derive(Debug)]
pub struct GameSession {
    /// Primary key of the game; doubles as the broadcast room name.
    pub id: Uuid,
    /// Mode being played.
    pub mode: GameMode,
    /// Questions served so far, one per round.
    pub questions: Vec<Question>,
    /// Index of the round being played, `None` before the first round.
    pub current_index: Option<usize>,
    /// Adaptive difficulty level (1-10).
    pub difficulty: u8,
    /// Battle royale rounds played since the last difficulty step.
    pub streak: u32,
    /// Difficulty the current round aimed for.
    pub round_target: u8,
    /// Participants that are not eliminated, in join order.
    pub active: IndexSet<PlayerId>,
    /// Every participant, humans first then bots.
    pub players: IndexMap<PlayerId, Player>,
    /// Bot difficulty profile governing every bot of the game.
    pub bot_profile: String,
    /// Players at creation, bots included.
    pub initial_player_count: usize,
    /// When the current round opened.
    pub round_started_at: Option<Instant>,
    /// Pending reveal timer of the open round.
    pub reveal_timer: Option<TimerHandle>,
}

impl GameSession {
    /// Build a new session from the moved players and the initial question batch.
    pub fn new(
        mode: GameMode,
        players: IndexMap<PlayerId, Player>,
        questions: Vec<Question>,
        bot_profile: String,
    ) -> Self {
        let active: IndexSet<PlayerId> = players.keys().cloned().collect();
        Self {
            id: Uuid::new_v4(),
            mode,
            questions,
            current_index: None,
            difficulty: mode.start_difficulty(),
            streak: 0,
            round_target: mode.start_difficulty(),
            initial_player_count: active.len(),
            active,
            players,
            bot_profile,
            round_started_at: None,
            reveal_timer: None,
        }
    }

    /// Broadcast room of the game.
    pub fn room(&self) -> String {
        self.id.to_string()
    }

    /// One-based number of the current round (0 before the first round).
    pub fn round_number(&self) -> usize {
        self.current_index.map_or(0, |index| index + 1)
    }

    /// Question of the round being played.
    pub fn current_question(&self) -> Option<&Question> {
        self.current_index
            .and_then(|index| self.questions.get(index))
    }

    /// Human players in join order.
    pub fn humans(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|player| !player.is_bot)
    }

    /// Number of human players.
    pub fn human_count(&self) -> usize {
        self.humans().count()
    }

    /// Players taking part in the current round: everyone in classic, active players in battle royale.
    pub fn round_population(&self) -> Vec<PlayerId> {
        match self.mode {
            GameMode::Classic => self.players.keys().cloned().collect(),
            GameMode::BattleRoyale => self.active.iter().cloned().collect(),
        }
    }

    /// Whether every human still in contention has answered the open round.
    pub fn all_humans_answered(&self) -> bool {
        self.humans()
            .filter(|player| !player.eliminated)
            .all(|player| player.round.answered)
    }
}
