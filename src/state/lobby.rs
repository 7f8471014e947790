use crate::state::game::{GameMode, PlayerId};

/// One waiting player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyEntry {
    /// Participant id.
    pub id: PlayerId,
    /// Display name.
    pub username: String,
    /// Mode the player queued for.
    pub mode: GameMode,
    /// Bot difficulty profile the player asked for.
    pub bot_difficulty: String,
}

/// The process-wide countdown; at most one mode counts down at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyCountdown {
    /// Mode counting down, if any.
    pub mode: Option<GameMode>,
    /// Seconds left on the countdown.
    pub remaining_secs: u64,
    /// Whether a countdown is running.
    pub active: bool,
    /// Bumped on every start so ticks armed for an older countdown are ignored.
    pub generation: u64,
}

impl LobbyCountdown {
    /// Countdown at rest with a full wait.
    pub fn idle(wait_secs: u64) -> Self {
        Self {
            mode: None,
            remaining_secs: wait_secs,
            active: false,
            generation: 0,
        }
    }

    /// Mode being counted down, if any.
    pub fn active_mode(&self) -> Option<GameMode> {
        self.mode.filter(|_| self.active)
    }

    pub(crate) fn reset(&mut self, wait_secs: u64) {
        self.mode = None;
        self.active = false;
        self.remaining_secs = wait_secs;
    }
}
