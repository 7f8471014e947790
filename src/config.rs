//! Game tuning loaded from an optional JSON file, falling back to baked-in defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/game.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_CONFIG_PATH";
/// Points multiplier never drops below this floor, however late the answer.
const MIN_TIME_FACTOR: f64 = 0.1;

/// Behaviour of simulated opponents for one difficulty preference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BotProfile {
    /// Probability of answering correctly.
    pub accuracy: f64,
    /// Earliest answer, as a fraction of the question duration.
    pub min_delay_factor: f64,
    /// Latest answer, as a fraction of the question duration.
    pub max_delay_factor: f64,
}

impl BotProfile {
    const fn new(accuracy: f64, min_delay_factor: f64, max_delay_factor: f64) -> Self {
        Self {
            accuracy,
            min_delay_factor,
            max_delay_factor,
        }
    }
}

/// Immutable game configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Countdown length of a lobby.
    #[serde(rename = "lobby_wait_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lobby_wait: Duration,
    /// Questions drawn for a classic game, and per battle royale replenishment.
    pub questions_per_game: usize,
    /// Time a question stays open.
    #[serde(rename = "question_duration_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub question_duration: Duration,
    /// Points of an instant correct answer.
    pub points_base: u32,
    /// Bots added to a lone classic player, lower bound.
    pub min_bots: usize,
    /// Bots added to a lone classic player, upper bound; also caps battle royale fill-ins.
    pub max_bots: usize,
    /// Battle royale games are topped up with bots below this participant count.
    pub br_min_total_entities: usize,
    /// Battle royale rounds per difficulty step.
    pub br_difficulty_step: u32,
    /// Questions drawn when a battle royale game starts.
    pub br_initial_questions_batch: usize,
    /// Pause between game creation and the first question.
    #[serde(rename = "game_start_delay_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub game_start_delay: Duration,
    /// Time results stay on screen after a reveal.
    #[serde(rename = "results_display_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub results_display: Duration,
    /// Extra gap between results and the next question.
    #[serde(rename = "round_gap_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub round_gap: Duration,
    /// Pause before a battle royale with a single survivor is torn down.
    #[serde(rename = "final_results_pause_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub final_results_pause: Duration,
    /// Bot profile used when a player asks for an unknown one.
    pub default_bot_difficulty: String,
    /// Known bot profiles by name.
    pub bot_difficulties: IndexMap<String, BotProfile>,
    /// CSV question bank.
    pub questions_path: PathBuf,
    /// Newline separated bot display names.
    pub bot_names_path: PathBuf,
    /// Model queried by the advice power-up.
    pub advice_model: String,
}

impl GameConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        profiles = config.bot_difficulties.len(),
                        "loaded game config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document, filling unspecified fields with defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(contents).map(Self::sanitized)
    }

    /// Points for a correct answer submitted `elapsed` after the question opened.
    pub fn points_for(&self, elapsed: Duration) -> u32 {
        let duration = self.question_duration.as_secs_f64();
        if duration <= 0.0 {
            return self.points_base;
        }
        let factor = ((duration - elapsed.as_secs_f64()) / duration).max(MIN_TIME_FACTOR);
        (f64::from(self.points_base) * factor).floor() as u32
    }

    /// Canonical profile name for a player's preference; unknown names map to the default.
    pub fn normalize_bot_difficulty(&self, requested: Option<&str>) -> String {
        requested
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| self.bot_difficulties.contains_key(name))
            .unwrap_or_else(|| self.default_bot_difficulty.clone())
    }

    /// Profile by name, falling back to the default profile.
    pub fn bot_profile(&self, name: &str) -> BotProfile {
        self.bot_difficulties
            .get(name)
            .or_else(|| self.bot_difficulties.get(&self.default_bot_difficulty))
            .cloned()
            .unwrap_or_else(|| BotProfile::new(0.6, 0.4, 0.8))
    }

    /// Clamp values that would break the game loop.
    fn sanitized(mut self) -> Self {
        if self.min_bots > self.max_bots {
            warn!(
                min_bots = self.min_bots,
                max_bots = self.max_bots,
                "min_bots exceeds max_bots; swapping"
            );
            std::mem::swap(&mut self.min_bots, &mut self.max_bots);
        }
        if self.br_difficulty_step == 0 {
            warn!("br_difficulty_step must be positive; using 1");
            self.br_difficulty_step = 1;
        }
        if !self
            .bot_difficulties
            .contains_key(&self.default_bot_difficulty)
        {
            warn!(
                default = %self.default_bot_difficulty,
                "default bot difficulty is not a known profile"
            );
        }
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            lobby_wait: Duration::from_secs(30),
            questions_per_game: 10,
            question_duration: Duration::from_secs(20),
            points_base: 1000,
            min_bots: 5,
            max_bots: 9,
            br_min_total_entities: 3,
            br_difficulty_step: 5,
            br_initial_questions_batch: 30,
            game_start_delay: Duration::from_secs(2),
            results_display: Duration::from_secs(5),
            round_gap: Duration::from_secs(2),
            final_results_pause: Duration::from_secs(3),
            default_bot_difficulty: "easy".into(),
            bot_difficulties: default_bot_profiles(),
            questions_path: PathBuf::from("data/trivia_questions.csv"),
            bot_names_path: PathBuf::from("data/bot_names.txt"),
            advice_model: "gemini-1.5-flash-latest".into(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in bot profiles shipped with the binary.
fn default_bot_profiles() -> IndexMap<String, BotProfile> {
    IndexMap::from([
        ("easy".to_string(), BotProfile::new(0.60, 0.4, 0.8)),
        ("advanced".to_string(), BotProfile::new(0.78, 0.3, 0.65)),
        ("expert".to_string(), BotProfile::new(0.90, 0.2, 0.5)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_answer_earns_full_points() {
        let config = GameConfig::default();
        assert_eq!(config.points_for(Duration::ZERO), 1000);
    }

    #[test]
    fn points_decay_linearly_with_time() {
        let config = GameConfig::default();
        assert_eq!(config.points_for(Duration::from_secs(5)), 750);
        assert_eq!(config.points_for(Duration::from_secs(10)), 500);
    }

    #[test]
    fn late_answers_keep_the_floor() {
        let config = GameConfig::default();
        assert_eq!(config.points_for(Duration::from_secs(19)), 100);
        assert_eq!(config.points_for(Duration::from_secs(45)), 100);
    }

    #[test]
    fn unknown_bot_difficulty_falls_back_to_default() {
        let config = GameConfig::default();
        assert_eq!(config.normalize_bot_difficulty(Some("Expert")), "expert");
        assert_eq!(config.normalize_bot_difficulty(Some("godlike")), "easy");
        assert_eq!(config.normalize_bot_difficulty(None), "easy");
        assert_eq!(config.bot_profile("godlike").accuracy, 0.60);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GameConfig::from_json_str(
            r#"{"lobby_wait_secs": 5, "questions_per_game": 3, "min_bots": 4, "max_bots": 2}"#,
        )
        .unwrap();

        assert_eq!(config.lobby_wait, Duration::from_secs(5));
        assert_eq!(config.questions_per_game, 3);
        assert_eq!((config.min_bots, config.max_bots), (2, 4));
        assert_eq!(config.question_duration, Duration::from_secs(20));
        assert_eq!(config.bot_difficulties.len(), 3);
    }
}
