//! Cancellable one-shot timers that post back into the session coordinator mailbox.
//!
//! Every event carries the identity of what it was armed for (game id, round,
//! lobby generation). The coordinator compares those tokens against the live
//! state, so a timer that fires after its game or round moved on is a no-op.

use std::{fmt, time::Duration};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{services::coordinator::Command, state::game::PlayerId};

/// Deferred work the coordinator schedules for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second of lobby countdown elapsed.
    LobbyTick {
        /// Countdown generation the tick was armed for.
        generation: u64,
    },
    /// Serve the round following `after_round` (0 for the first question).
    OpenRound {
        /// Game the round belongs to.
        game_id: Uuid,
        /// Last revealed round.
        after_round: usize,
    },
    /// The question duration of `round` elapsed.
    RevealDue {
        /// Game the round belongs to.
        game_id: Uuid,
        /// One-based round number.
        round: usize,
    },
    /// A bot's planned answer time for `round` arrived.
    BotAnswerDue {
        /// Game the round belongs to.
        game_id: Uuid,
        /// One-based round number.
        round: usize,
        /// Bot that answers.
        bot_id: PlayerId,
    },
    /// Tear the game down after the final results pause.
    EndGame {
        /// Game to end.
        game_id: Uuid,
    },
}

/// Owner of an armed timer; dropping or cancelling it disarms the timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    /// Wrap the closure that disarms the underlying timer.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Disarm the timer. Cancelling twice, or after it fired, does nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Arms timers on behalf of the lobby and game components.
pub trait Scheduler: Send + Sync {
    /// Deliver `event` to the coordinator once `after` has elapsed.
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerHandle;
}

/// Scheduler backed by Tokio sleep tasks.
///
/// Holds a weak sender so armed timers never keep the coordinator alive.
pub struct TokioScheduler {
    mailbox: mpsc::WeakUnboundedSender<Command>,
}

impl TokioScheduler {
    /// Create a scheduler posting into the given coordinator mailbox.
    pub fn new(mailbox: &mpsc::UnboundedSender<Command>) -> Self {
        Self {
            mailbox: mailbox.downgrade(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerHandle {
        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            match mailbox.upgrade() {
                Some(tx) => {
                    if tx.send(Command::Timer(event)).is_err() {
                        debug!("coordinator stopped before timer fired");
                    }
                }
                None => debug!("coordinator dropped before timer fired"),
            }
        });
        let abort = task.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}
