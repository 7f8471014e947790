//! Session actor: the single owner of the lobby and the live game.
//!
//! Socket handlers and timers never touch session state directly. They post
//! [`Command`]s into one mailbox and the coordinator applies them in order,
//! which is what keeps "one countdown, one game" true without locks.

use std::{sync::Arc, time::Duration};

use rand::rngs::StdRng;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::GameConfig,
    dto::{
        game::{AnswerReceipt, PowerUpResult},
        lobby::{ConnectionAck, CountdownUpdate, JoinLobbyRequest},
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{
        advice::AdviceService,
        broadcast::{Audience, Broadcaster},
        lobby::{LobbyManager, TickOutcome},
        orchestrator::{
            GameOrchestrator, GameSnapshot, PowerUpOutcome, RoundClose, RoundOpening,
            inter_round_delay,
        },
        questions::QuestionProvider,
        timer::{Scheduler, TimerEvent, TimerHandle, TokioScheduler},
    },
    state::game::{GameMode, PlayerId, PowerUp, PowerUps},
};

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum Command {
    /// A socket opened.
    Connected {
        /// Id assigned to the socket.
        participant: PlayerId,
    },
    /// Queue for a mode, or rejoin the running game.
    JoinLobby {
        /// Sender.
        participant: PlayerId,
        /// Join payload as received.
        request: JoinLobbyRequest,
    },
    /// Answer the open question.
    SubmitAnswer {
        /// Sender.
        participant: PlayerId,
        /// Chosen option.
        answer: String,
    },
    /// Spend a power-up; the name is parsed by the coordinator.
    UsePowerUp {
        /// Sender.
        participant: PlayerId,
        /// Power-up name as received.
        kind: String,
    },
    /// Relay a chat line.
    Chat {
        /// Sender.
        participant: PlayerId,
        /// Text, if any.
        text: Option<String>,
        /// Emoji, if any.
        emoji: Option<String>,
    },
    /// A socket closed.
    Disconnected {
        /// Id of the closed socket.
        participant: PlayerId,
    },
    /// An armed timer fired.
    Timer(TimerEvent),
    /// Read-only view for the health endpoint.
    Snapshot {
        /// Where to send the view.
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Read-only view of the whole session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Countdown status.
    pub lobby: CountdownUpdate,
    /// Players queued across every mode.
    pub waiting_players: usize,
    /// Running game, if any.
    pub game: Option<GameSnapshot>,
}

/// Cloneable sender side of the coordinator mailbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Post a command; dropped with a warning when the coordinator is gone.
    pub fn dispatch(&self, command: Command) {
        if let Err(err) = self.tx.send(command) {
            warn!(command = ?err.0, "session coordinator stopped; command dropped");
        }
    }

    /// Ask the coordinator for a snapshot. `None` when it stopped.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    /// Whether the coordinator task is still receiving.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Owner of the lobby and the live game.
pub struct SessionCoordinator {
    config: Arc<GameConfig>,
    broadcaster: Arc<dyn Broadcaster>,
    advice: Arc<dyn AdviceService>,
    scheduler: Arc<dyn Scheduler>,
    lobby: LobbyManager,
    game: GameOrchestrator,
    /// Pending inter-round or end-of-game step.
    step_timer: Option<TimerHandle>,
}

impl SessionCoordinator {
    /// Assemble a coordinator around an explicit scheduler.
    pub fn new(
        config: Arc<GameConfig>,
        broadcaster: Arc<dyn Broadcaster>,
        questions: Arc<dyn QuestionProvider>,
        advice: Arc<dyn AdviceService>,
        scheduler: Arc<dyn Scheduler>,
        bot_names: Vec<String>,
    ) -> Self {
        let lobby = LobbyManager::new(&config, Arc::clone(&broadcaster), Arc::clone(&scheduler));
        let game = GameOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&broadcaster),
            questions,
            Arc::clone(&scheduler),
            bot_names,
        );
        Self {
            config,
            broadcaster,
            advice,
            scheduler,
            lobby,
            game,
            step_timer: None,
        }
    }

    /// Replace the game's random source.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.game = self.game.with_rng(rng);
        self
    }

    /// Start the coordinator task with Tokio timers and return its handle.
    pub fn spawn(
        config: Arc<GameConfig>,
        broadcaster: Arc<dyn Broadcaster>,
        questions: Arc<dyn QuestionProvider>,
        advice: Arc<dyn AdviceService>,
        bot_names: Vec<String>,
    ) -> SessionHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioScheduler::new(&tx));
        let mut coordinator =
            Self::new(config, broadcaster, questions, advice, scheduler, bot_names);

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                coordinator.handle(command);
            }
            info!("session coordinator stopped");
        });
        SessionHandle { tx }
    }

    /// Apply one command.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Connected { participant } => self.on_connected(participant),
            Command::JoinLobby {
                participant,
                request,
            } => self.on_join(participant, request),
            Command::SubmitAnswer {
                participant,
                answer,
            } => self.on_answer(&participant, answer),
            Command::UsePowerUp { participant, kind } => self.on_power_up(&participant, &kind),
            Command::Chat {
                participant,
                text,
                emoji,
            } => {
                if let Err(err) = self.game.chat(&participant, text, emoji) {
                    self.reject(&participant, err);
                }
            }
            Command::Disconnected { participant } => self.on_disconnect(&participant),
            Command::Timer(event) => self.on_timer(event),
            Command::Snapshot { reply } => {
                if reply.send(self.snapshot()).is_err() {
                    debug!("snapshot requester went away");
                }
            }
        }
    }

    /// Read-only view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            lobby: self.lobby.status(self.game.is_active()),
            waiting_players: self.lobby.waiting_count(),
            game: self.game.snapshot(),
        }
    }

    fn on_connected(&self, participant: PlayerId) {
        let lobby = self.lobby.status(self.game.is_active());
        self.broadcaster.send(
            Audience::Participant(participant.clone()),
            ServerMessage::ConnectionAck(ConnectionAck {
                participant_id: participant,
                lobby,
            }),
        );
    }

    fn on_join(&mut self, participant: PlayerId, request: JoinLobbyRequest) {
        let entry = match request.into_entry(participant.clone(), &self.config) {
            Ok(entry) => entry,
            Err(err) => return self.reject(&participant, err),
        };
        let mode = entry.mode;

        if let Some(running) = self.game.session().map(|session| session.mode) {
            if !self.game.rejoin(&participant, mode, Instant::now()) {
                self.reject(
                    &participant,
                    ServiceError::InvalidState(format!(
                        "A {running} game is in progress. Please wait."
                    )),
                );
            }
            return;
        }

        let previous = self.lobby.upsert(entry);
        info!(player = %participant, %mode, "player queued");

        let counting = self.lobby.countdown().active_mode();
        let switched_out = previous
            .map(|previous| previous.mode)
            .filter(|old| *old != mode && counting == Some(*old));
        if let Some(old) = switched_out {
            if self.lobby.has_players_for(old) {
                self.lobby.broadcast_status();
            } else {
                info!(%old, "last player switched out of the countdown");
                self.lobby.stop(true);
                self.resume_lobby();
            }
        }

        match self.lobby.countdown().active_mode() {
            None => {
                self.lobby.start(mode, false);
            }
            Some(active) if active == mode => self.lobby.broadcast_status(),
            Some(active) => {
                self.lobby.send_status_to(&participant, mode);
                self.broadcaster.send(
                    Audience::Participant(participant),
                    ServerMessage::error(format!(
                        "A {active} lobby is active. You've been added to the queue for {mode}."
                    )),
                );
            }
        }
    }

    fn on_answer(&mut self, participant: &str, answer: String) {
        match self.game.submit_answer(participant, &answer, Instant::now()) {
            Ok(accepted) => {
                self.broadcaster.send(
                    Audience::Participant(participant.to_string()),
                    ServerMessage::AnswerReceipt(AnswerReceipt {
                        round_number: accepted.round,
                        answer,
                    }),
                );
                if accepted.all_humans_answered {
                    debug!(round = accepted.round, "every human answered; closing early");
                    self.close_round(accepted.game_id, accepted.round);
                }
            }
            Err(err) => self.reject(participant, err),
        }
    }

    fn on_power_up(&mut self, participant: &str, kind: &str) {
        let kind = match kind.parse::<PowerUp>() {
            Ok(kind) => kind,
            Err(err) => return self.reject(participant, err),
        };
        match self.game.use_power_up(participant, kind) {
            Ok(PowerUpOutcome::Applied) => {}
            Ok(PowerUpOutcome::AdviceRequested {
                question,
                options,
                remaining,
            }) => self.request_advice(participant, &question, &options, remaining),
            Err(err) => self.reject(participant, err),
        }
    }

    /// Query the advice service off the actor; the reply goes straight to the player.
    fn request_advice(
        &self,
        participant: &str,
        question: &str,
        options: &[String],
        remaining: PowerUps,
    ) {
        let pending = self.advice.advise(question, options);
        let broadcaster = Arc::clone(&self.broadcaster);
        let participant = participant.to_string();
        tokio::spawn(async move {
            let advice = pending.await;
            debug!(player = %participant, "advice ready");
            broadcaster.send(
                Audience::Participant(participant),
                ServerMessage::PowerUpResult(PowerUpResult::advice(remaining, advice)),
            );
        });
    }

    fn on_disconnect(&mut self, participant: &str) {
        if let Some(departure) = self.game.remove_player(participant) {
            if departure.humans_remaining == 0 {
                info!(game_id = %departure.game_id, player = %departure.username, "last human left; ending game");
                self.finish_game();
            } else if let Some(round) = departure.round_ready_to_close {
                self.close_round(departure.game_id, round);
            }
            return;
        }

        if self.lobby.remove(participant).is_none() {
            return;
        }
        debug!(player = %participant, "player left the lobby");
        if let Some(mode) = self.lobby.countdown().active_mode() {
            if self.lobby.has_players_for(mode) {
                self.lobby.broadcast_status();
            } else {
                self.lobby.stop(true);
                self.resume_lobby();
            }
        }
    }

    fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::LobbyTick { generation } => {
                match self.lobby.tick(generation, self.game.is_active()) {
                    TickOutcome::Ignored | TickOutcome::Continue => {}
                    TickOutcome::Abandoned(_) => {
                        self.resume_lobby();
                    }
                    TickOutcome::Finished(mode) => {
                        let created = self.create_game(mode);
                        self.lobby.finish(mode);
                        if !created {
                            self.resume_lobby();
                        }
                    }
                }
            }
            TimerEvent::OpenRound {
                game_id,
                after_round,
            } => {
                if self.game.next_question(game_id, after_round) == RoundOpening::Ended {
                    self.after_game_end();
                }
            }
            TimerEvent::RevealDue { game_id, round } => self.close_round(game_id, round),
            TimerEvent::BotAnswerDue {
                game_id,
                round,
                bot_id,
            } => self.game.bot_answer_due(game_id, round, &bot_id),
            TimerEvent::EndGame { game_id } => {
                if self.game.owns(game_id) {
                    self.finish_game();
                } else {
                    debug!(%game_id, "ignoring end of a finished game");
                }
            }
        }
    }

    /// Hand the players queued for `mode` to a new game.
    fn create_game(&mut self, mode: GameMode) -> bool {
        if self.game.is_active() {
            warn!(%mode, "countdown finished while a game is running");
            return false;
        }
        let entries = self.lobby.take_players_for(mode);
        if entries.is_empty() {
            debug!(%mode, "countdown finished without players");
            return false;
        }
        match self.game.create_game(mode, entries) {
            Ok(game_id) => {
                self.arm_step(
                    self.config.game_start_delay,
                    TimerEvent::OpenRound {
                        game_id,
                        after_round: 0,
                    },
                );
                true
            }
            Err(err) => {
                error!(error = %err, %mode, "failed to create game");
                false
            }
        }
    }

    fn close_round(&mut self, game_id: Uuid, round: usize) {
        match self.game.reveal_answers(game_id, round) {
            RoundClose::NotOpen => {}
            RoundClose::Continue { round } => self.arm_step(
                inter_round_delay(&self.config),
                TimerEvent::OpenRound {
                    game_id,
                    after_round: round,
                },
            ),
            RoundClose::Finished { .. } => {
                self.arm_step(self.config.final_results_pause, TimerEvent::EndGame { game_id })
            }
        }
    }

    fn finish_game(&mut self) {
        if self.game.end_game() {
            self.after_game_end();
        }
    }

    /// Return control to the lobby once the game is gone.
    fn after_game_end(&mut self) {
        if let Some(mut timer) = self.step_timer.take() {
            timer.cancel();
        }
        self.lobby.stop(true);
        self.resume_lobby();
    }

    fn resume_lobby(&mut self) -> Option<GameMode> {
        let next = self
            .lobby
            .trigger_next_waiting_lobby_if_any(&GameMode::PRIORITY, self.game.is_active());
        if let Some(mode) = next {
            info!(%mode, "resuming waiting lobby");
        }
        next
    }

    fn arm_step(&mut self, after: Duration, event: TimerEvent) {
        self.step_timer = Some(self.scheduler.schedule(after, event));
    }

    fn reject(&self, participant: &str, err: ServiceError) {
        warn!(player = %participant, error = %err, "rejected player action");
        self.broadcaster.send(
            Audience::Participant(participant.to_string()),
            ServerMessage::error(err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::services::{
        advice::UnavailableAdvisor,
        broadcast::RecordingBroadcaster,
        questions::{QuestionBank, QuestionRecord},
        testing::ManualScheduler,
    };

    struct Harness {
        session: SessionCoordinator,
        broadcaster: Arc<RecordingBroadcaster>,
        scheduler: Arc<ManualScheduler>,
    }

    fn harness() -> Harness {
        let config = GameConfig {
            lobby_wait: Duration::from_secs(2),
            questions_per_game: 2,
            question_duration: Duration::from_secs(10),
            min_bots: 1,
            max_bots: 3,
            ..GameConfig::default()
        };
        let records = (1..=10)
            .map(|level| QuestionRecord {
                text: format!("question {level}"),
                correct_answer: "right".into(),
                wrong_answers: vec!["no".into(), "nope".into(), "never".into()],
                difficulty: level,
            })
            .collect();
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let scheduler = Arc::new(ManualScheduler::default());
        let session = SessionCoordinator::new(
            Arc::new(config),
            broadcaster.clone(),
            Arc::new(QuestionBank::from_records(records)),
            Arc::new(UnavailableAdvisor),
            scheduler.clone(),
            Vec::new(),
        )
        .with_rng(StdRng::seed_from_u64(11));
        Harness {
            session,
            broadcaster,
            scheduler,
        }
    }

    fn join(h: &mut Harness, id: &str, mode: &str) {
        h.session.handle(Command::JoinLobby {
            participant: id.into(),
            request: JoinLobbyRequest {
                username: format!("player {id}"),
                mode: Some(mode.into()),
                bot_difficulty: None,
            },
        });
    }

    /// Fire the first pending timer matching `predicate`.
    fn fire(h: &mut Harness, predicate: impl Fn(&TimerEvent) -> bool) -> bool {
        match h.scheduler.take_first(predicate) {
            Some(event) => {
                h.session.handle(Command::Timer(event));
                true
            }
            None => false,
        }
    }

    fn run_countdown(h: &mut Harness) {
        while fire(h, |event| matches!(event, TimerEvent::LobbyTick { .. })) {}
    }

    fn errors_for(h: &Harness, id: &str) -> Vec<String> {
        h.broadcaster
            .sent()
            .into_iter()
            .filter_map(|(audience, message)| match (audience, message) {
                (Audience::Participant(to), ServerMessage::Error { message }) if to == id => {
                    Some(message)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connection_is_acknowledged_with_lobby_status() {
        let mut h = harness();
        h.session.handle(Command::Connected {
            participant: "a".into(),
        });
        match h.broadcaster.events("connection_ack").pop() {
            Some((Audience::Participant(id), ServerMessage::ConnectionAck(ack))) => {
                assert_eq!(id, "a");
                assert_eq!(ack.participant_id, "a");
                assert!(!ack.lobby.active);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn second_mode_waits_behind_the_running_countdown() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        assert_eq!(
            h.session.snapshot().lobby.mode,
            Some(GameMode::Classic)
        );

        join(&mut h, "b", "battle_royale");
        assert_eq!(
            errors_for(&h, "b"),
            ["A classic lobby is active. You've been added to the queue for battle_royale."]
        );
        assert_eq!(h.session.snapshot().waiting_players, 2);
    }

    #[test]
    fn invalid_join_is_rejected() {
        let mut h = harness();
        join(&mut h, "a", "speedrun");
        assert_eq!(errors_for(&h, "a"), ["Invalid game mode."]);
        assert_eq!(h.session.snapshot().waiting_players, 0);
    }

    #[test]
    fn countdown_hands_players_to_a_new_game() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        run_countdown(&mut h);

        let snapshot = h.session.snapshot();
        let game = snapshot.game.expect("game created");
        assert_eq!(game.mode, GameMode::Classic);
        let bots = game.players.iter().filter(|p| p.is_bot).count();
        assert!((1..=3).contains(&bots), "{bots} bots");
        assert_eq!(snapshot.waiting_players, 0);
        assert!(!snapshot.lobby.active);
        assert!(
            h.scheduler
                .pending()
                .iter()
                .any(|(after, event)| *after == Duration::from_secs(2)
                    && matches!(event, TimerEvent::OpenRound { after_round: 0, .. }))
        );

        join(&mut h, "b", "classic");
        assert_eq!(
            errors_for(&h, "b"),
            ["A classic game is in progress. Please wait."]
        );
    }

    #[test]
    fn answering_alone_closes_the_round_early() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        run_countdown(&mut h);
        assert!(fire(&mut h, |event| matches!(event, TimerEvent::OpenRound { .. })));

        h.session.handle(Command::SubmitAnswer {
            participant: "a".into(),
            answer: "right".into(),
        });
        assert_eq!(h.broadcaster.events("answer_receipt").len(), 1);
        assert_eq!(h.broadcaster.events("question_result").len(), 1);
        assert!(
            h.scheduler
                .pending()
                .iter()
                .any(|(_, event)| matches!(event, TimerEvent::OpenRound { after_round: 1, .. }))
        );

        // The natural reveal timer was cancelled and a late one is ignored.
        h.session.handle(Command::Timer(TimerEvent::RevealDue {
            game_id: h.session.snapshot().game.map(|g| g.game_id).unwrap_or_default(),
            round: 1,
        }));
        assert_eq!(h.broadcaster.events("question_result").len(), 1);
    }

    #[test]
    fn classic_game_runs_to_game_over() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        run_countdown(&mut h);

        for _ in 0..2 {
            assert!(fire(&mut h, |event| matches!(event, TimerEvent::OpenRound { .. })));
            assert!(fire(&mut h, |event| matches!(event, TimerEvent::RevealDue { .. })));
        }
        assert!(fire(&mut h, |event| matches!(event, TimerEvent::OpenRound { .. })));

        assert_eq!(h.broadcaster.events("game_over").len(), 1);
        assert!(h.session.snapshot().game.is_none());
        assert!(h.scheduler.pending().is_empty());
    }

    #[test]
    fn last_human_leaving_ends_the_game_and_resumes_the_queue() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        join(&mut h, "b", "battle_royale");
        run_countdown(&mut h);
        assert!(h.session.snapshot().game.is_some());
        assert!(!h.session.snapshot().lobby.active);

        h.session.handle(Command::Disconnected {
            participant: "a".into(),
        });
        assert_eq!(h.broadcaster.events("game_over").len(), 1);
        let snapshot = h.session.snapshot();
        assert!(snapshot.game.is_none());
        assert_eq!(snapshot.lobby.mode, Some(GameMode::BattleRoyale));
        assert!(snapshot.lobby.active);
    }

    #[test]
    fn emptied_countdown_stops_and_starts_the_next_mode() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        join(&mut h, "b", "battle_royale");

        h.session.handle(Command::Disconnected {
            participant: "a".into(),
        });
        let lobby = h.session.snapshot().lobby;
        assert_eq!(lobby.mode, Some(GameMode::BattleRoyale));
        assert!(lobby.active);
    }

    #[test]
    fn switching_out_of_the_countdown_hands_it_over() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        join(&mut h, "a", "battle_royale");

        let snapshot = h.session.snapshot();
        assert_eq!(snapshot.lobby.mode, Some(GameMode::BattleRoyale));
        assert_eq!(snapshot.waiting_players, 1);
    }

    #[test]
    fn unknown_power_up_is_rejected() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        run_countdown(&mut h);
        fire(&mut h, |event| matches!(event, TimerEvent::OpenRound { .. }));

        h.session.handle(Command::UsePowerUp {
            participant: "a".into(),
            kind: "time_freeze".into(),
        });
        assert_eq!(errors_for(&h, "a"), ["Cannot use power-up time_freeze."]);
    }

    #[tokio::test]
    async fn advice_reply_reaches_the_player() {
        let mut h = harness();
        join(&mut h, "a", "classic");
        run_countdown(&mut h);
        fire(&mut h, |event| matches!(event, TimerEvent::OpenRound { .. }));

        h.session.handle(Command::UsePowerUp {
            participant: "a".into(),
            kind: "call_friend".into(),
        });
        for _ in 0..10 {
            if !h.broadcaster.events("power_up_result").is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        match h.broadcaster.events("power_up_result").pop() {
            Some((Audience::Participant(id), ServerMessage::PowerUpResult(result))) => {
                assert_eq!(id, "a");
                assert_eq!(result.advice.as_deref(), Some("AI friend unavailable."));
            }
            other => panic!("expected advice, got {other:?}"),
        }
    }
}
