//! Outbound fan-out seam between the session logic and the transport.

use crate::{dto::ws::ServerMessage, state::game::PlayerId};

/// Who receives a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connected participant.
    Everyone,
    /// Members of a room (the game id).
    Room(String),
    /// Members of a room except one participant.
    RoomExcept {
        /// Room name.
        room: String,
        /// Participant skipped.
        except: PlayerId,
    },
    /// A single participant.
    Participant(PlayerId),
}

/// Delivers server messages and manages room membership.
pub trait Broadcaster: Send + Sync {
    /// Deliver `message` to `audience`. Delivery is best effort.
    fn send(&self, audience: Audience, message: ServerMessage);
    /// Add a participant to a room.
    fn join_room(&self, room: &str, participant: &str);
    /// Remove a participant from a room.
    fn leave_room(&self, room: &str, participant: &str);
    /// Drop a room and all of its memberships.
    fn close_room(&self, room: &str);
}

/// Broadcaster that records deliveries in memory instead of sending them.
///
/// Only built for tests, or with the `test-support` feature for integration tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    sent: std::sync::Mutex<Vec<(Audience, ServerMessage)>>,
    memberships: std::sync::Mutex<Vec<(String, PlayerId)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingBroadcaster {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery so far, in order.
    pub fn sent(&self) -> Vec<(Audience, ServerMessage)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Messages whose event name matches `event`, in order.
    pub fn events(&self, event: &str) -> Vec<(Audience, ServerMessage)> {
        self.sent()
            .into_iter()
            .filter(|(_, message)| message.event_name() == event)
            .collect()
    }

    /// Drain recorded deliveries.
    pub fn take(&self) -> Vec<(Audience, ServerMessage)> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    /// Current room members.
    pub fn members(&self, room: &str) -> Vec<PlayerId> {
        self.memberships
            .lock()
            .map(|memberships| {
                memberships
                    .iter()
                    .filter(|(name, _)| name == room)
                    .map(|(_, participant)| participant.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Broadcaster for RecordingBroadcaster {
    fn send(&self, audience: Audience, message: ServerMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((audience, message));
        }
    }

    fn join_room(&self, room: &str, participant: &str) {
        if let Ok(mut memberships) = self.memberships.lock() {
            memberships.push((room.to_string(), participant.to_string()));
        }
    }

    fn leave_room(&self, room: &str, participant: &str) {
        if let Ok(mut memberships) = self.memberships.lock() {
            memberships.retain(|(name, member)| !(name == room && member == participant));
        }
    }

    fn close_room(&self, room: &str) {
        if let Ok(mut memberships) = self.memberships.lock() {
            memberships.retain(|(name, _)| name != room);
        }
    }
}
