//! Waiting room and the single process-wide countdown.

use std::{sync::Arc, time::Duration};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::{
    config::GameConfig,
    dto::{
        lobby::{CountdownUpdate, LobbyPlayer},
        ws::ServerMessage,
    },
    services::{
        broadcast::{Audience, Broadcaster},
        timer::{Scheduler, TimerEvent, TimerHandle},
    },
    state::{
        game::{GameMode, PlayerId},
        lobby::{LobbyCountdown, LobbyEntry},
    },
};

const TICK: Duration = Duration::from_secs(1);

/// What a countdown tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stale tick, or the countdown was already reset.
    Ignored,
    /// One second elapsed; next tick armed.
    Continue,
    /// Everyone waiting for the mode left.
    Abandoned(GameMode),
    /// The countdown reached zero; the caller should create the game then call [`LobbyManager::finish`].
    Finished(GameMode),
}

/// Owns the waiting players and the countdown.
pub struct LobbyManager {
    entries: IndexMap<PlayerId, LobbyEntry>,
    countdown: LobbyCountdown,
    tick_timer: Option<TimerHandle>,
    wait_secs: u64,
    broadcaster: Arc<dyn Broadcaster>,
    scheduler: Arc<dyn Scheduler>,
}

impl LobbyManager {
    /// Create an idle lobby.
    pub fn new(
        config: &GameConfig,
        broadcaster: Arc<dyn Broadcaster>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let wait_secs = config.lobby_wait.as_secs();
        Self {
            entries: IndexMap::new(),
            countdown: LobbyCountdown::idle(wait_secs),
            tick_timer: None,
            wait_secs,
            broadcaster,
            scheduler,
        }
    }

    /// Current countdown state.
    pub fn countdown(&self) -> &LobbyCountdown {
        &self.countdown
    }

    /// Waiting entry for a participant.
    pub fn entry(&self, participant: &str) -> Option<&LobbyEntry> {
        self.entries.get(participant)
    }

    /// Number of waiting players across all modes.
    pub fn waiting_count(&self) -> usize {
        self.entries.len()
    }

    /// Insert or update a waiting player, returning the previous entry.
    pub fn upsert(&mut self, entry: LobbyEntry) -> Option<LobbyEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    /// Remove a waiting player.
    pub fn remove(&mut self, participant: &str) -> Option<LobbyEntry> {
        self.entries.shift_remove(participant)
    }

    /// Waiting players for a mode, in join order.
    pub fn players_for(&self, mode: GameMode) -> Vec<&LobbyEntry> {
        self.entries
            .values()
            .filter(|entry| entry.mode == mode)
            .collect()
    }

    /// Whether anyone waits for `mode`.
    pub fn has_players_for(&self, mode: GameMode) -> bool {
        self.entries.values().any(|entry| entry.mode == mode)
    }

    /// Move every player waiting for `mode` out of the lobby.
    pub fn take_players_for(&mut self, mode: GameMode) -> Vec<LobbyEntry> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_values()
            .partition(|entry| entry.mode == mode);
        self.entries = kept
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        taken
    }

    /// Start counting down for `mode`.
    ///
    /// Returns `false` when a game is running, another mode already counts
    /// down, or nobody waits for `mode`. Never preempts a running countdown.
    pub fn start(&mut self, mode: GameMode, game_active: bool) -> bool {
        if game_active {
            return false;
        }
        match self.countdown.active_mode() {
            Some(current) if current == mode => {
                self.broadcast_status();
                return true;
            }
            Some(current) => {
                debug!(requested = %mode, %current, "countdown already running for another mode");
                return false;
            }
            None => {}
        }

        if !self.has_players_for(mode) {
            self.reset();
            self.emit(self.update_for(mode, false));
            return false;
        }

        self.countdown.generation += 1;
        self.countdown.mode = Some(mode);
        self.countdown.active = true;
        self.countdown.remaining_secs = self.wait_secs;
        info!(%mode, seconds = self.wait_secs, "lobby countdown started");
        self.broadcast_status();
        self.schedule_tick();
        true
    }

    /// Stop the countdown, optionally broadcasting the inactive state. Returns whether one was running.
    pub fn stop(&mut self, emit_update: bool) -> bool {
        let stopped = self.countdown.active_mode();
        self.reset();
        match stopped {
            Some(mode) => {
                info!(%mode, "lobby countdown stopped");
                if emit_update {
                    self.emit(self.update_for(mode, false));
                }
                true
            }
            None => false,
        }
    }

    /// When idle, start counting down for the first mode in `priority` that has waiting players.
    pub fn trigger_next_waiting_lobby_if_any(
        &mut self,
        priority: &[GameMode],
        game_active: bool,
    ) -> Option<GameMode> {
        if game_active || self.countdown.active {
            return None;
        }
        let mode = priority
            .iter()
            .copied()
            .find(|mode| self.has_players_for(*mode))?;
        self.start(mode, game_active).then_some(mode)
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self, generation: u64, game_active: bool) -> TickOutcome {
        if generation != self.countdown.generation {
            debug!(generation, current = self.countdown.generation, "ignoring stale lobby tick");
            return TickOutcome::Ignored;
        }
        if game_active {
            self.reset();
            return TickOutcome::Ignored;
        }
        let Some(mode) = self.countdown.active_mode() else {
            self.reset();
            return TickOutcome::Ignored;
        };

        if !self.has_players_for(mode) {
            info!(%mode, "lobby emptied during countdown");
            self.reset();
            self.emit(self.update_for(mode, false));
            return TickOutcome::Abandoned(mode);
        }

        self.countdown.remaining_secs = self.countdown.remaining_secs.saturating_sub(1);
        if self.countdown.remaining_secs == 0 {
            self.tick_timer = None;
            info!(%mode, "lobby countdown finished");
            return TickOutcome::Finished(mode);
        }

        self.broadcast_status();
        self.schedule_tick();
        TickOutcome::Continue
    }

    /// Reset after [`TickOutcome::Finished`] and broadcast the inactive state.
    pub fn finish(&mut self, mode: GameMode) {
        self.reset();
        self.emit(self.update_for(mode, false));
    }

    /// Broadcast the running countdown, if any.
    pub fn broadcast_status(&self) {
        if let Some(mode) = self.countdown.active_mode() {
            self.emit(self.update_for(mode, true));
        }
    }

    /// Send `participant` the status of `mode` without touching the countdown.
    pub fn send_status_to(&self, participant: &str, mode: GameMode) {
        let active = self.countdown.active_mode() == Some(mode);
        self.broadcaster.send(
            Audience::Participant(participant.to_string()),
            ServerMessage::CountdownUpdate(self.update_for(mode, active)),
        );
    }

    /// Status of the running countdown, or an idle placeholder.
    pub fn status(&self, game_active: bool) -> CountdownUpdate {
        match self.countdown.active_mode() {
            Some(mode) if !game_active => self.update_for(mode, true),
            _ => CountdownUpdate {
                mode: None,
                seconds_remaining: self.wait_secs,
                players: Vec::new(),
                active: false,
            },
        }
    }

    /// Countdown payload for `mode`.
    pub fn update_for(&self, mode: GameMode, active: bool) -> CountdownUpdate {
        CountdownUpdate {
            mode: Some(mode),
            seconds_remaining: if active {
                self.countdown.remaining_secs
            } else {
                self.wait_secs
            },
            players: self
                .players_for(mode)
                .into_iter()
                .map(LobbyPlayer::from)
                .collect(),
            active,
        }
    }

    fn emit(&self, update: CountdownUpdate) {
        self.broadcaster
            .send(Audience::Everyone, ServerMessage::CountdownUpdate(update));
    }

    fn schedule_tick(&mut self) {
        let timer = self.scheduler.schedule(
            TICK,
            TimerEvent::LobbyTick {
                generation: self.countdown.generation,
            },
        );
        self.tick_timer = Some(timer);
    }

    fn reset(&mut self) {
        if let Some(mut timer) = self.tick_timer.take() {
            timer.cancel();
        }
        self.countdown.reset(self.wait_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{broadcast::RecordingBroadcaster, testing::ManualScheduler};

    struct Harness {
        lobby: LobbyManager,
        broadcaster: Arc<RecordingBroadcaster>,
        scheduler: Arc<ManualScheduler>,
    }

    fn harness(wait_secs: u64) -> Harness {
        let config = GameConfig {
            lobby_wait: Duration::from_secs(wait_secs),
            ..GameConfig::default()
        };
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let scheduler = Arc::new(ManualScheduler::default());
        let lobby = LobbyManager::new(&config, broadcaster.clone(), scheduler.clone());
        Harness {
            lobby,
            broadcaster,
            scheduler,
        }
    }

    fn entry(id: &str, mode: GameMode) -> LobbyEntry {
        LobbyEntry {
            id: id.into(),
            username: id.to_uppercase(),
            mode,
            bot_difficulty: "easy".into(),
        }
    }

    fn fire(h: &mut Harness) -> Vec<TickOutcome> {
        h.scheduler
            .take_pending()
            .into_iter()
            .map(|event| match event {
                TimerEvent::LobbyTick { generation } => h.lobby.tick(generation, false),
                other => panic!("unexpected timer {other:?}"),
            })
            .collect()
    }

    fn last_update(h: &Harness) -> CountdownUpdate {
        match h.broadcaster.events("countdown_update").pop() {
            Some((_, ServerMessage::CountdownUpdate(update))) => update,
            other => panic!("expected countdown update, got {other:?}"),
        }
    }

    #[test]
    fn countdown_ticks_down_to_finish() {
        let mut h = harness(3);
        h.lobby.upsert(entry("a", GameMode::Classic));
        assert!(h.lobby.start(GameMode::Classic, false));
        assert_eq!(last_update(&h).seconds_remaining, 3);

        assert_eq!(fire(&mut h), [TickOutcome::Continue]);
        assert_eq!(last_update(&h).seconds_remaining, 2);
        assert_eq!(fire(&mut h), [TickOutcome::Continue]);
        assert_eq!(fire(&mut h), [TickOutcome::Finished(GameMode::Classic)]);
        assert!(h.scheduler.pending().is_empty());

        let players = h.lobby.take_players_for(GameMode::Classic);
        assert_eq!(players.len(), 1);
        h.lobby.finish(GameMode::Classic);
        let update = last_update(&h);
        assert!(!update.active);
        assert!(update.players.is_empty());
        assert_eq!(h.lobby.countdown().active_mode(), None);
    }

    #[test]
    fn only_one_mode_counts_down() {
        let mut h = harness(10);
        h.lobby.upsert(entry("a", GameMode::Classic));
        h.lobby.upsert(entry("b", GameMode::BattleRoyale));

        assert!(h.lobby.start(GameMode::Classic, false));
        assert!(!h.lobby.start(GameMode::BattleRoyale, false));
        assert_eq!(h.lobby.countdown().active_mode(), Some(GameMode::Classic));
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[test]
    fn no_countdown_while_a_game_runs() {
        let mut h = harness(10);
        h.lobby.upsert(entry("a", GameMode::Classic));
        assert!(!h.lobby.start(GameMode::Classic, true));
        assert_eq!(
            h.lobby
                .trigger_next_waiting_lobby_if_any(&GameMode::PRIORITY, true),
            None
        );
        assert!(h.scheduler.pending().is_empty());
    }

    #[test]
    fn empty_lobby_abandons_on_next_tick() {
        let mut h = harness(10);
        h.lobby.upsert(entry("a", GameMode::BattleRoyale));
        h.lobby.start(GameMode::BattleRoyale, false);
        h.lobby.remove("a");

        assert_eq!(fire(&mut h), [TickOutcome::Abandoned(GameMode::BattleRoyale)]);
        assert!(!last_update(&h).active);
        assert!(h.scheduler.pending().is_empty());
    }

    #[test]
    fn stale_ticks_are_ignored_after_restart() {
        let mut h = harness(10);
        h.lobby.upsert(entry("a", GameMode::Classic));
        h.lobby.start(GameMode::Classic, false);
        let stale = h.lobby.countdown().generation;
        h.lobby.stop(false);
        h.lobby.start(GameMode::Classic, false);

        assert_eq!(h.lobby.tick(stale, false), TickOutcome::Ignored);
        assert_eq!(h.lobby.countdown().remaining_secs, 10);
    }

    #[test]
    fn next_waiting_lobby_follows_priority() {
        let mut h = harness(10);
        h.lobby.upsert(entry("br", GameMode::BattleRoyale));
        h.lobby.upsert(entry("cl", GameMode::Classic));

        assert_eq!(
            h.lobby
                .trigger_next_waiting_lobby_if_any(&GameMode::PRIORITY, false),
            Some(GameMode::Classic)
        );
        assert_eq!(
            h.lobby
                .trigger_next_waiting_lobby_if_any(&GameMode::PRIORITY, false),
            None
        );
    }

    #[test]
    fn take_players_keeps_other_modes_in_order() {
        let mut h = harness(10);
        h.lobby.upsert(entry("a", GameMode::Classic));
        h.lobby.upsert(entry("b", GameMode::BattleRoyale));
        h.lobby.upsert(entry("c", GameMode::Classic));
        h.lobby.upsert(entry("d", GameMode::BattleRoyale));

        let taken: Vec<_> = h
            .lobby
            .take_players_for(GameMode::Classic)
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(taken, ["a", "c"]);
        let left: Vec<_> = h
            .lobby
            .players_for(GameMode::BattleRoyale)
            .into_iter()
            .map(|entry| entry.id.clone())
            .collect();
        assert_eq!(left, ["b", "d"]);
    }
}
