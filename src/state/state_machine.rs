use serde::Serialize;
use thiserror::Error;

/// High-level phases the game can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GamePhase {
    /// No game is running; lobbies may count down.
    Idle,
    /// A game is running and is in one of the round sub-phases.
    InProgress(RoundPhase),
}

/// Fine-grained phase while a game is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "round_phase", rename_all = "snake_case")]
pub enum RoundPhase {
    /// Game created, first question not yet served.
    Starting,
    /// A question is open for answers.
    QuestionOpen {
        /// One-based round number.
        round: usize,
    },
    /// The round was scored and its results broadcast.
    Revealed {
        /// One-based round number.
        round: usize,
    },
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Players were moved from the lobby into a new game.
    GameCreated,
    /// A question was served for the given round.
    QuestionOpened {
        /// One-based round number.
        round: usize,
    },
    /// Answers for the given round were scored.
    AnswersRevealed {
        /// One-based round number.
        round: usize,
    },
    /// The game was torn down.
    GameEnded,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: GamePhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
}

/// State machine guarding the round lifecycle of the live game.
///
/// Timer callbacks and early-close paths race each other; any event that is not
/// valid from the current phase is rejected, which is what makes closing a
/// round idempotent.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    phase: GamePhase,
    version: usize,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            phase: GamePhase::Idle,
            version: 0,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Round currently accepting answers, if any.
    pub fn open_round(&self) -> Option<usize> {
        match self.phase {
            GamePhase::InProgress(RoundPhase::QuestionOpen { round }) => Some(round),
            _ => None,
        }
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
        }
    }

    /// Validate an event without applying it.
    pub fn check(&self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        self.compute_transition(event)
    }

    /// Apply an event, moving the state machine to the next phase.
    pub fn apply(&mut self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (GamePhase::Idle, GameEvent::GameCreated) => {
                GamePhase::InProgress(RoundPhase::Starting)
            }
            (GamePhase::InProgress(RoundPhase::Starting), GameEvent::QuestionOpened { round })
                if round == 1 =>
            {
                GamePhase::InProgress(RoundPhase::QuestionOpen { round })
            }
            (
                GamePhase::InProgress(RoundPhase::Revealed { round: revealed }),
                GameEvent::QuestionOpened { round },
            ) if round == revealed + 1 => GamePhase::InProgress(RoundPhase::QuestionOpen { round }),
            (
                GamePhase::InProgress(RoundPhase::QuestionOpen { round: open }),
                GameEvent::AnswersRevealed { round },
            ) if round == open => GamePhase::InProgress(RoundPhase::Revealed { round }),
            (GamePhase::InProgress(_), GameEvent::GameEnded) => GamePhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut GameStateMachine, event: GameEvent) -> GamePhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.phase(), GamePhase::Idle);
        assert_eq!(sm.open_round(), None);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = GameStateMachine::new();

        assert_eq!(
            apply(&mut sm, GameEvent::GameCreated),
            GamePhase::InProgress(RoundPhase::Starting)
        );
        assert_eq!(
            apply(&mut sm, GameEvent::QuestionOpened { round: 1 }),
            GamePhase::InProgress(RoundPhase::QuestionOpen { round: 1 })
        );
        assert_eq!(sm.open_round(), Some(1));
        assert_eq!(
            apply(&mut sm, GameEvent::AnswersRevealed { round: 1 }),
            GamePhase::InProgress(RoundPhase::Revealed { round: 1 })
        );
        assert_eq!(
            apply(&mut sm, GameEvent::QuestionOpened { round: 2 }),
            GamePhase::InProgress(RoundPhase::QuestionOpen { round: 2 })
        );
        assert_eq!(apply(&mut sm, GameEvent::GameEnded), GamePhase::Idle);
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn second_reveal_of_a_round_is_rejected() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::GameCreated);
        apply(&mut sm, GameEvent::QuestionOpened { round: 1 });
        apply(&mut sm, GameEvent::AnswersRevealed { round: 1 });

        let err = sm.apply(GameEvent::AnswersRevealed { round: 1 }).unwrap_err();
        assert_eq!(
            err.from,
            GamePhase::InProgress(RoundPhase::Revealed { round: 1 })
        );
    }

    #[test]
    fn stale_round_events_are_rejected() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::GameCreated);
        apply(&mut sm, GameEvent::QuestionOpened { round: 1 });

        assert!(sm.check(GameEvent::AnswersRevealed { round: 2 }).is_err());
        assert!(sm.check(GameEvent::QuestionOpened { round: 2 }).is_err());
        apply(&mut sm, GameEvent::AnswersRevealed { round: 1 });
        assert!(sm.check(GameEvent::QuestionOpened { round: 3 }).is_err());
        assert!(sm.check(GameEvent::QuestionOpened { round: 2 }).is_ok());
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = GameStateMachine::new();
        let err = sm.apply(GameEvent::GameEnded).unwrap_err();
        match err {
            InvalidTransition { from, event } => {
                assert_eq!(from, GamePhase::Idle);
                assert_eq!(event, GameEvent::GameEnded);
            }
        }
        assert_eq!(sm.snapshot().version, 0);
    }
}
