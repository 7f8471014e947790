//! Round lifecycle of the live game: question dispatch, answers, reveal,
//! scoring, elimination and teardown.
//!
//! The orchestrator arms the per-round timers it owns (reveal and bot answers)
//! but never schedules the next round itself; the coordinator composes rounds
//! from the [`RoundClose`] it gets back.

use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom, seq::SliceRandom};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::GameConfig,
    dto::{
        game::{
            ChatMessage, GameOver, GameStarting, LeaderboardEntry, NewQuestion, PlayerLeft,
            PlayerSnapshot, PlayerUsedPowerUp, PowerUpResult, QuestionResult, player_snapshots,
        },
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{
        bots::{self, BotAnswer, BotScheduler},
        broadcast::{Audience, Broadcaster},
        questions::{DEFAULT_TOLERANCE, QuestionProvider},
        timer::{Scheduler, TimerEvent},
    },
    state::{
        game::{
            GameMode, GameSession, MAX_DIFFICULTY, MIN_DIFFICULTY, Player, PlayerId, PowerUp,
            PowerUps, Question,
        },
        lobby::LobbyEntry,
        state_machine::{GameEvent, GamePhase, GameStateMachine},
    },
};

/// Classic accuracy above which difficulty goes up.
const RAISE_ACCURACY: f64 = 0.65;
/// Classic accuracy below which difficulty goes down.
const LOWER_ACCURACY: f64 = 0.35;

/// Result of trying to open a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOpening {
    /// A question went out for this round.
    Opened {
        /// One-based round number.
        round: usize,
    },
    /// The game ended instead (winner found or questions exhausted).
    Ended,
    /// Stale request for a game or round that moved on.
    Skipped,
}

/// Result of closing a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundClose {
    /// The round was not open (already revealed, or stale).
    NotOpen,
    /// Results are out; the next round should follow.
    Continue {
        /// Revealed round.
        round: usize,
    },
    /// Results are out and the battle royale has at most one survivor.
    Finished {
        /// Revealed round.
        round: usize,
    },
}

/// An accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerAccepted {
    /// Game answered in.
    pub game_id: Uuid,
    /// Round answered.
    pub round: usize,
    /// Whether the answer scores.
    pub correct: bool,
    /// Every human still in contention has answered.
    pub all_humans_answered: bool,
}

/// What the caller still has to do after a power-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerUpOutcome {
    /// Fully handled.
    Applied,
    /// The advice service must be queried; the reply goes to the player.
    AdviceRequested {
        /// Question text.
        question: String,
        /// Options shown to the player.
        options: Vec<String>,
        /// Power-ups left after this one.
        remaining: PowerUps,
    },
}

/// A participant removed from the running game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Game left.
    pub game_id: Uuid,
    /// Display name.
    pub username: String,
    /// Humans still in the game.
    pub humans_remaining: usize,
    /// Set when the departure leaves every remaining human answered.
    pub round_ready_to_close: Option<usize>,
}

/// Read-only view of the running game.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GameSnapshot {
    /// Identifier of the game.
    pub game_id: Uuid,
    /// Mode being played.
    pub mode: GameMode,
    /// Current round phase.
    pub phase: GamePhase,
    /// Transitions the round state machine applied since startup.
    pub phase_version: usize,
    /// One-based, 0 before the first question.
    pub round_number: usize,
    /// Current adaptive difficulty level.
    pub difficulty: u8,
    /// Players not yet eliminated.
    pub active_player_count: usize,
    /// Every player in join order.
    pub players: Vec<PlayerSnapshot>,
}

/// Owner of the single live game.
pub struct GameOrchestrator {
    config: Arc<GameConfig>,
    broadcaster: Arc<dyn Broadcaster>,
    questions: Arc<dyn QuestionProvider>,
    scheduler: Arc<dyn Scheduler>,
    bot_names: Vec<String>,
    machine: GameStateMachine,
    session: Option<GameSession>,
    bots: BotScheduler,
    rng: StdRng,
}

impl GameOrchestrator {
    /// Create an idle orchestrator.
    pub fn new(
        config: Arc<GameConfig>,
        broadcaster: Arc<dyn Broadcaster>,
        questions: Arc<dyn QuestionProvider>,
        scheduler: Arc<dyn Scheduler>,
        bot_names: Vec<String>,
    ) -> Self {
        Self {
            config,
            broadcaster,
            questions,
            scheduler,
            bot_names,
            machine: GameStateMachine::new(),
            session: None,
            bots: BotScheduler::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the random source, for reproducible games.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Whether a game is running.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The running game.
    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    /// Whether `game_id` is the running game.
    pub fn owns(&self, game_id: Uuid) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.id == game_id)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> GamePhase {
        self.machine.phase()
    }

    /// Read-only view of the running game.
    pub fn snapshot(&self) -> Option<GameSnapshot> {
        let session = self.session.as_ref()?;
        let machine = self.machine.snapshot();
        Some(GameSnapshot {
            game_id: session.id,
            mode: session.mode,
            phase: machine.phase,
            phase_version: machine.version,
            round_number: session.round_number(),
            difficulty: session.difficulty,
            active_player_count: session.active.len(),
            players: player_snapshots(session),
        })
    }

    /// Create a game from the players absorbed from the lobby, adding bots per mode rules.
    pub fn create_game(
        &mut self,
        mode: GameMode,
        entries: Vec<LobbyEntry>,
    ) -> Result<Uuid, ServiceError> {
        if self.session.is_some() {
            return Err(ServiceError::InvalidState(
                "A game is already in progress.".into(),
            ));
        }
        let Some(first) = entries.first() else {
            return Err(ServiceError::InvalidState(format!(
                "No players are waiting for {mode}."
            )));
        };
        let bot_profile = self
            .config
            .normalize_bot_difficulty(Some(first.bot_difficulty.as_str()));

        let mut players: IndexMap<PlayerId, Player> = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), Player::human(entry.id, entry.username)))
            .collect();
        let humans = players.len();
        let bot_count = bots::bots_to_add(mode, humans, &self.config, &mut self.rng);
        for bot in bots::create_bots(bot_count, &self.bot_names, &mut self.rng) {
            players.insert(bot.id.clone(), bot);
        }

        let batch = match mode {
            GameMode::Classic => self.config.questions_per_game,
            GameMode::BattleRoyale => self.config.br_initial_questions_batch,
        };
        let questions =
            self.questions
                .sample(batch, Some(mode.start_difficulty()), DEFAULT_TOLERANCE);

        self.machine.apply(GameEvent::GameCreated)?;
        let session = GameSession::new(mode, players, questions, bot_profile);
        let room = session.room();
        for human in session.humans() {
            self.broadcaster.join_room(&room, &human.id);
        }

        info!(
            game_id = %session.id,
            %mode,
            humans,
            bots = bot_count,
            questions = session.questions.len(),
            profile = %session.bot_profile,
            "game created"
        );
        self.broadcaster.send(
            Audience::Room(room),
            ServerMessage::GameStarting(GameStarting {
                game_id: session.id,
                mode,
                players: player_snapshots(&session),
                initial_player_count: session.initial_player_count,
                is_rejoin: false,
                current_question: None,
                active_player_ids: None,
            }),
        );

        let game_id = session.id;
        self.session = Some(session);
        Ok(game_id)
    }

    /// Open the round following `after_round`.
    pub fn next_question(&mut self, game_id: Uuid, after_round: usize) -> RoundOpening {
        if !self.owns(game_id) {
            debug!(%game_id, "ignoring round opening for a finished game");
            return RoundOpening::Skipped;
        }
        let round = after_round + 1;
        let event = GameEvent::QuestionOpened { round };
        if let Err(err) = self.machine.check(event) {
            debug!(error = %err, "ignoring stale round opening");
            return RoundOpening::Skipped;
        }

        self.bots.clear();

        let Some(session) = self.session.as_mut() else {
            return RoundOpening::Skipped;
        };
        if session.mode.is_battle_royale() && session.active.len() <= 1 {
            info!(game_id = %session.id, active = session.active.len(), "battle royale decided");
            self.end_game();
            return RoundOpening::Ended;
        }

        for id in session.round_population() {
            if let Some(player) = session.players.get_mut(&id) {
                player.round = Default::default();
            }
        }
        let index = after_round;
        session.current_index = Some(index);
        let target = target_difficulty(session, self.config.br_difficulty_step);

        if index >= session.questions.len() {
            match session.mode {
                GameMode::Classic => {
                    info!(game_id = %session.id, rounds = after_round, "all questions asked");
                    self.end_game();
                    return RoundOpening::Ended;
                }
                GameMode::BattleRoyale => {
                    let batch = self.questions.sample(
                        self.config.questions_per_game,
                        Some(target),
                        DEFAULT_TOLERANCE,
                    );
                    if batch.is_empty() {
                        error!(game_id = %session.id, "question bank exhausted during battle royale");
                        self.end_game();
                        return RoundOpening::Ended;
                    }
                    debug!(game_id = %session.id, added = batch.len(), target, "question pool replenished");
                    session.questions.extend(batch);
                }
            }
        }

        let Some(question) = draw_question(self.questions.as_ref(), target) else {
            error!(game_id = %session.id, "no question available; ending game");
            self.end_game();
            return RoundOpening::Ended;
        };
        session.questions[index] = question.clone();
        session.round_target = target;

        let duration = self.config.question_duration;
        self.broadcaster.send(
            Audience::Room(session.room()),
            ServerMessage::NewQuestion(NewQuestion::for_round(session, &question, target, duration)),
        );
        session.round_started_at = Some(Instant::now());

        let profile = self.config.bot_profile(&session.bot_profile);
        let population = session.round_population();
        let eligible_bots = population
            .iter()
            .filter(|id| session.players.get(*id).is_some_and(|player| player.is_bot));
        for bot_id in eligible_bots {
            self.bots.schedule_bot_answer(
                self.scheduler.as_ref(),
                session.id,
                round,
                bot_id,
                &question,
                &profile,
                duration,
                &mut self.rng,
            );
        }

        session.reveal_timer = Some(
            self.scheduler
                .schedule(duration, TimerEvent::RevealDue { game_id, round }),
        );

        if let Err(err) = self.machine.apply(event) {
            warn!(error = %err, "round opened outside of the expected phase");
        }
        info!(
            %game_id,
            round,
            difficulty = question.difficulty,
            target,
            bots = self.bots.pending_count(),
            "question opened"
        );
        RoundOpening::Opened { round }
    }

    /// A bot's own timer fired.
    pub fn bot_answer_due(&mut self, game_id: Uuid, round: usize, bot_id: &str) {
        if !self.owns(game_id) || self.machine.open_round() != Some(round) {
            debug!(bot = %bot_id, round, "ignoring bot answer for a closed round");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session
            .players
            .get(bot_id)
            .is_none_or(|player| player.eliminated)
        {
            return;
        }

        let config = &self.config;
        if let Some(answer) = self
            .bots
            .resolve(bot_id, &mut self.rng, |delay| config.points_for(delay))
        {
            if let Some(player) = session.players.get_mut(bot_id) {
                apply_bot_answer(player, &answer);
            }
        }
    }

    /// Record a human's answer for the open round.
    pub fn submit_answer(
        &mut self,
        participant: &str,
        answer: &str,
        now: Instant,
    ) -> Result<AnswerAccepted, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::NotInGame)?;
        if !session.players.contains_key(participant) {
            return Err(ServiceError::NotInGame);
        }
        let round = self
            .machine
            .open_round()
            .ok_or_else(|| ServiceError::InvalidState("No question is open.".into()))?;
        let question = session
            .current_question()
            .cloned()
            .ok_or_else(|| ServiceError::InvalidState("No question is open.".into()))?;
        let started = session.round_started_at.unwrap_or(now);

        let Some(player) = session.players.get_mut(participant) else {
            return Err(ServiceError::NotInGame);
        };
        if player.is_bot {
            return Err(ServiceError::InvalidInput("Bots cannot submit answers.".into()));
        }
        if player.eliminated {
            return Err(ServiceError::InvalidState("You have been eliminated.".into()));
        }
        if player.round.answered {
            return Err(ServiceError::InvalidState("Already answered.".into()));
        }

        let correct = question.is_correct(answer);
        player.round.answered = true;
        player.round.correct = correct;
        player.round.pending_points = if correct {
            self.config
                .points_for(now.saturating_duration_since(started))
        } else {
            0
        };
        debug!(
            player = %participant,
            round,
            correct,
            points = player.round.pending_points,
            "answer recorded"
        );

        Ok(AnswerAccepted {
            game_id: session.id,
            round,
            correct,
            all_humans_answered: session.all_humans_answered(),
        })
    }

    /// Close `round`: force pending bots, score, eliminate and broadcast results.
    pub fn reveal_answers(&mut self, game_id: Uuid, round: usize) -> RoundClose {
        if !self.owns(game_id) {
            return RoundClose::NotOpen;
        }
        let event = GameEvent::AnswersRevealed { round };
        if let Err(err) = self.machine.check(event) {
            debug!(error = %err, "round already closed");
            return RoundClose::NotOpen;
        }
        let Some(session) = self.session.as_mut() else {
            return RoundClose::NotOpen;
        };
        if let Some(mut timer) = session.reveal_timer.take() {
            timer.cancel();
        }

        let config = &self.config;
        let forced = self
            .bots
            .force_pending(&mut self.rng, |delay| config.points_for(delay));
        for (bot_id, answer) in &forced {
            if let Some(player) = session.players.get_mut(bot_id) {
                apply_bot_answer(player, answer);
            }
        }
        if !forced.is_empty() {
            debug!(round, forced = forced.len(), "pending bots resolved at reveal");
        }

        let population = session.round_population();
        for id in &population {
            let Some(player) = session.players.get_mut(id) else {
                continue;
            };
            let correct = player.answered_correctly();
            if correct {
                let mut points = player.round.pending_points;
                if player.round.double_armed {
                    points = points.saturating_mul(2);
                    player.round.double_armed = false;
                }
                player.score = player.score.saturating_add(points);
            }
            player.last_round_correct = Some(correct);
        }

        let battle_royale = session.mode.is_battle_royale();
        if battle_royale {
            let eliminated: Vec<PlayerId> = session
                .active
                .iter()
                .filter(|id| {
                    session
                        .players
                        .get(*id)
                        .is_none_or(|player| !player.answered_correctly())
                })
                .cloned()
                .collect();
            session.active.retain(|id| !eliminated.contains(id));
            let place = session.active.len() as u32 + 1;
            for id in &eliminated {
                if let Some(player) = session.players.get_mut(id) {
                    player.eliminated = true;
                    player.place = Some(place);
                }
            }
            if !eliminated.is_empty() {
                info!(round, eliminated = eliminated.len(), active = session.active.len(), "players eliminated");
            }
        }

        let correct_answer = session
            .current_question()
            .map(|question| question.correct_answer.clone())
            .unwrap_or_default();
        let players = population
            .iter()
            .filter_map(|id| session.players.get(id))
            .map(PlayerSnapshot::from)
            .collect();
        self.broadcaster.send(
            Audience::Room(session.room()),
            ServerMessage::QuestionResult(QuestionResult {
                mode: session.mode,
                round_number: round,
                correct_answer,
                players,
                active_player_count: battle_royale.then_some(session.active.len()),
            }),
        );

        let decided = battle_royale && session.active.len() <= 1;
        if let Err(err) = self.machine.apply(event) {
            warn!(error = %err, "reveal applied outside of the expected phase");
        }
        info!(%game_id, round, "round revealed");

        if decided {
            RoundClose::Finished { round }
        } else {
            RoundClose::Continue { round }
        }
    }

    /// Broadcast final standings and tear the game down. Returns whether a game was running.
    pub fn end_game(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        self.bots.clear();
        if let Some(mut timer) = session.reveal_timer.take() {
            timer.cancel();
        }

        assign_final_places(&mut session);
        let leaderboard = leaderboard(&session);
        let room = session.room();
        self.broadcaster.send(
            Audience::Room(room.clone()),
            ServerMessage::GameOver(GameOver {
                game_id: session.id,
                mode: session.mode,
                leaderboard,
            }),
        );
        self.broadcaster.close_room(&room);

        if let Err(err) = self.machine.apply(GameEvent::GameEnded) {
            warn!(error = %err, "game ended outside of a running phase");
        }
        info!(game_id = %session.id, mode = %session.mode, rounds = session.round_number(), "game ended");
        true
    }

    /// Spend a power-up for the open round.
    pub fn use_power_up(
        &mut self,
        participant: &str,
        kind: PowerUp,
    ) -> Result<PowerUpOutcome, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::NotInGame)?;
        let open = self.machine.open_round().is_some();
        let question = session.current_question().cloned();
        let room = session.room();

        let Some(player) = session.players.get_mut(participant) else {
            return Err(ServiceError::NotInGame);
        };
        if player.is_bot || !player.power_ups.is_available(kind) {
            return Err(ServiceError::PowerUpUnavailable(kind.to_string()));
        }
        if player.eliminated {
            return Err(ServiceError::InvalidState("You have been eliminated.".into()));
        }
        let question = match question {
            Some(question) if open => question,
            _ => return Err(ServiceError::InvalidState("No question is open.".into())),
        };

        player.power_ups.consume(kind);
        let remaining = player.power_ups;
        let username = player.name.clone();
        let outcome = match kind {
            PowerUp::HalveOptions => {
                let mut options = vec![question.correct_answer.clone()];
                if let Some(wrong) = question.wrong_options().choose(&mut self.rng) {
                    options.push((*wrong).clone());
                }
                options.shuffle(&mut self.rng);
                self.broadcaster.send(
                    Audience::Participant(participant.to_string()),
                    ServerMessage::PowerUpResult(PowerUpResult::halved(remaining, options)),
                );
                PowerUpOutcome::Applied
            }
            PowerUp::DoubleScore => {
                player.round.double_armed = true;
                self.broadcaster.send(
                    Audience::Participant(participant.to_string()),
                    ServerMessage::PowerUpResult(PowerUpResult::double_armed(remaining)),
                );
                PowerUpOutcome::Applied
            }
            PowerUp::AskAdvice => PowerUpOutcome::AdviceRequested {
                question: question.text.clone(),
                options: question.options.clone(),
                remaining,
            },
        };

        info!(player = %participant, %kind, "power-up used");
        self.broadcaster.send(
            Audience::RoomExcept {
                room,
                except: participant.to_string(),
            },
            ServerMessage::PlayerUsedPowerUp(PlayerUsedPowerUp { username, kind }),
        );
        Ok(outcome)
    }

    /// Relay a chat line to the game room; blank messages are ignored.
    pub fn chat(
        &self,
        participant: &str,
        text: Option<String>,
        emoji: Option<String>,
    ) -> Result<(), ServiceError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidState("Chat is only available in a game.".into()))?;
        let player = session.players.get(participant).ok_or(ServiceError::NotInGame)?;

        let text = text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let emoji = emoji
            .map(|emoji| emoji.trim().to_string())
            .filter(|emoji| !emoji.is_empty());
        if text.is_none() && emoji.is_none() {
            return Ok(());
        }

        self.broadcaster.send(
            Audience::Room(session.room()),
            ServerMessage::ChatMessage(ChatMessage {
                sender_id: player.id.clone(),
                sender_name: player.name.clone(),
                is_bot: player.is_bot,
                text,
                emoji,
            }),
        );
        Ok(())
    }

    /// Send a reconnecting participant the current game state.
    ///
    /// Returns `false` when the participant is not part of the running game of `mode`.
    pub fn rejoin(&self, participant: &str, mode: GameMode, now: Instant) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.mode != mode || !session.players.contains_key(participant) {
            return false;
        }

        let room = session.room();
        self.broadcaster.join_room(&room, participant);
        let current_question = match (self.machine.open_round(), session.current_question()) {
            (Some(_), Some(question)) => {
                let elapsed = session
                    .round_started_at
                    .map_or(Duration::ZERO, |opened| now.saturating_duration_since(opened));
                Some(NewQuestion::for_round(
                    session,
                    question,
                    session.round_target,
                    self.config.question_duration.saturating_sub(elapsed),
                ))
            }
            _ => None,
        };
        self.broadcaster.send(
            Audience::Participant(participant.to_string()),
            ServerMessage::GameStarting(GameStarting {
                game_id: session.id,
                mode,
                players: player_snapshots(session),
                initial_player_count: session.initial_player_count,
                is_rejoin: true,
                current_question,
                active_player_ids: Some(session.active.iter().cloned().collect()),
            }),
        );
        info!(player = %participant, game_id = %session.id, "player rejoined");
        true
    }

    /// Remove a disconnected participant from the running game.
    pub fn remove_player(&mut self, participant: &str) -> Option<Departure> {
        let session = self.session.as_mut()?;
        let player = session.players.shift_remove(participant)?;
        session.active.shift_remove(participant);
        let room = session.room();
        self.broadcaster.leave_room(&room, participant);
        self.broadcaster.send(
            Audience::Room(room),
            ServerMessage::PlayerLeft(PlayerLeft {
                id: player.id.clone(),
                username: player.name.clone(),
                players: player_snapshots(session),
            }),
        );

        let humans_remaining = session.human_count();
        let round_ready_to_close = self
            .machine
            .open_round()
            .filter(|_| humans_remaining > 0 && session.all_humans_answered());
        info!(player = %participant, humans_remaining, "player left the game");

        Some(Departure {
            game_id: session.id,
            username: player.name,
            humans_remaining,
            round_ready_to_close,
        })
    }
}

/// Record a resolved bot answer on its player.
fn apply_bot_answer(player: &mut Player, answer: &BotAnswer) {
    player.round.answered = true;
    player.round.correct = answer.correct;
    player.round.pending_points = answer.points;
}

/// One question near `target`, falling back to any difficulty.
fn draw_question(provider: &dyn QuestionProvider, target: u8) -> Option<Question> {
    provider
        .sample(1, Some(target), DEFAULT_TOLERANCE)
        .into_iter()
        .next()
        .or_else(|| provider.sample(1, None, DEFAULT_TOLERANCE).into_iter().next())
}

/// Classic level after a round with the given human accuracy.
pub fn classic_step(current: u8, accuracy: f64) -> u8 {
    if accuracy > RAISE_ACCURACY {
        current.saturating_add(1).min(MAX_DIFFICULTY)
    } else if accuracy < LOWER_ACCURACY {
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    } else {
        current
    }
}

/// Share of humans that got the last revealed round right.
fn human_accuracy(session: &GameSession) -> Option<f64> {
    let outcomes: Vec<bool> = session
        .humans()
        .filter_map(|player| player.last_round_correct)
        .collect();
    if outcomes.is_empty() {
        return None;
    }
    let correct = outcomes.iter().filter(|correct| **correct).count();
    Some(correct as f64 / outcomes.len() as f64)
}

/// Update the adaptive difficulty for the round at `session.current_index` and return its target.
fn target_difficulty(session: &mut GameSession, step: u32) -> u8 {
    match session.mode {
        GameMode::BattleRoyale => {
            session.streak += 1;
            if session.streak >= step {
                session.difficulty = session.difficulty.saturating_add(1).min(MAX_DIFFICULTY);
                session.streak = 0;
            }
            session.difficulty
        }
        GameMode::Classic => {
            if session.current_index == Some(0) {
                return MIN_DIFFICULTY;
            }
            if let Some(accuracy) = human_accuracy(session) {
                session.difficulty = classic_step(session.difficulty, accuracy);
            }
            session.difficulty
        }
    }
}

/// Rank everyone without a place by score; eliminated players keep theirs.
fn assign_final_places(session: &mut GameSession) {
    let mut unranked: Vec<(PlayerId, u32)> = session
        .players
        .values()
        .filter(|player| player.place.is_none())
        .map(|player| (player.id.clone(), player.score))
        .collect();
    unranked.sort_by(|a, b| b.1.cmp(&a.1));
    for (position, (id, _)) in unranked.into_iter().enumerate() {
        if let Some(player) = session.players.get_mut(&id) {
            player.place = Some(position as u32 + 1);
        }
    }
}

/// Final standings sorted by score descending, ties in join order.
fn leaderboard(session: &GameSession) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> =
        session.players.values().map(LeaderboardEntry::from).collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

/// Time between a reveal and the next question.
pub fn inter_round_delay(config: &GameConfig) -> Duration {
    config.results_display + config.round_gap
}
