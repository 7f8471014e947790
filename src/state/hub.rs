use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    services::broadcast::{Audience, Broadcaster},
    state::game::PlayerId,
};

/// Registry of connected participants and the rooms they belong to.
#[derive(Default)]
pub struct RoomHub {
    connections: DashMap<PlayerId, mpsc::UnboundedSender<Message>>,
    rooms: DashMap<String, HashSet<PlayerId>>,
}

impl RoomHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the writer channel of a freshly connected participant.
    pub fn register(&self, participant: PlayerId, tx: mpsc::UnboundedSender<Message>) {
        self.connections.insert(participant, tx);
    }

    /// Forget a participant and all of its room memberships.
    pub fn unregister(&self, participant: &str) {
        self.connections.remove(participant);
        for mut room in self.rooms.iter_mut() {
            room.remove(participant);
        }
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn room_members(&self, room: &str) -> Vec<PlayerId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, participant: &str, payload: &str) {
        let Some(tx) = self
            .connections
            .get(participant)
            .map(|entry| entry.value().clone())
        else {
            debug!(%participant, "dropping message for unknown participant");
            return;
        };

        if tx.send(Message::Text(payload.to_owned().into())).is_err() {
            debug!(%participant, "writer closed; message dropped");
        }
    }
}

impl Broadcaster for RoomHub {
    fn send(&self, audience: Audience, message: ServerMessage) {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, event = message.event_name(), "failed to serialize server message");
                return;
            }
        };

        let recipients: Vec<PlayerId> = match audience {
            Audience::Everyone => self
                .connections
                .iter()
                .map(|entry| entry.key().clone())
                .collect(),
            Audience::Room(room) => self.room_members(&room),
            Audience::RoomExcept { room, except } => self
                .room_members(&room)
                .into_iter()
                .filter(|member| *member != except)
                .collect(),
            Audience::Participant(participant) => vec![participant],
        };

        for participant in recipients {
            self.deliver(&participant, &payload);
        }
    }

    fn join_room(&self, room: &str, participant: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(participant.to_string());
    }

    fn leave_room(&self, room: &str, participant: &str) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(participant);
        }
    }

    fn close_room(&self, room: &str) {
        self.rooms.remove(room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(hub: &RoomHub, id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register(id.to_string(), tx);
        rx
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<Message>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn room_delivery_skips_non_members_and_excluded() {
        let hub = RoomHub::new();
        let mut alice = connect(&hub, "alice");
        let mut bob = connect(&hub, "bob");
        let mut carol = connect(&hub, "carol");
        hub.join_room("g1", "alice");
        hub.join_room("g1", "bob");

        hub.send(
            Audience::RoomExcept {
                room: "g1".into(),
                except: "alice".into(),
            },
            ServerMessage::error("hello"),
        );
        hub.send(Audience::Room("g1".into()), ServerMessage::error("all"));

        assert_eq!(received(&mut alice), 1);
        assert_eq!(received(&mut bob), 2);
        assert_eq!(received(&mut carol), 0);
    }

    #[test]
    fn unregister_drops_memberships() {
        let hub = RoomHub::new();
        let mut alice = connect(&hub, "alice");
        hub.join_room("g1", "alice");
        hub.unregister("alice");

        hub.send(Audience::Everyone, ServerMessage::error("gone"));
        assert_eq!(received(&mut alice), 0);
        assert_eq!(hub.connection_count(), 0);
        assert!(hub.room_members("g1").is_empty());
    }
}
