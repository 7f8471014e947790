use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::coordinator::Command,
    state::{SharedState, game::PlayerId},
};

/// Handle the full lifecycle of one player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let participant: PlayerId = Uuid::new_v4().simple().to_string();
    state.hub().register(participant.clone(), outbound_tx.clone());
    info!(id = %participant, "player connected");
    state.session().dispatch(Command::Connected {
        participant: participant.clone(),
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(id = %participant, payload = %text, "received player message");
                match ClientMessage::from_json_str(&text) {
                    Ok(ClientMessage::Unknown) => {
                        warn!(id = %participant, "ignoring unknown message type");
                    }
                    Ok(message) => {
                        if let Some(command) = into_command(participant.clone(), message) {
                            state.session().dispatch(command);
                        }
                    }
                    Err(err) => {
                        warn!(id = %participant, error = %err, "failed to parse player message");
                        send_to_socket(&outbound_tx, &ServerMessage::error("Malformed message."));
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(id = %participant, "player closed the connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %participant, error = %err, "websocket error");
                break;
            }
        }
    }

    state.session().dispatch(Command::Disconnected {
        participant: participant.clone(),
    });
    state.hub().unregister(&participant);
    info!(id = %participant, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Map a parsed client message onto a coordinator command.
fn into_command(participant: PlayerId, message: ClientMessage) -> Option<Command> {
    let command = match message {
        ClientMessage::JoinLobby(request) => Command::JoinLobby {
            participant,
            request,
        },
        ClientMessage::SubmitAnswer { answer } => Command::SubmitAnswer {
            participant,
            answer,
        },
        ClientMessage::UsePowerUp { kind } => Command::UsePowerUp { participant, kind },
        ClientMessage::Chat { message, emoji } => Command::Chat {
            participant,
            text: message,
            emoji,
        },
        ClientMessage::Unknown => return None,
    };
    Some(command)
}

/// Serialize a message straight onto this socket's writer, bypassing the hub.
fn send_to_socket(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize message `{message:?}`"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_maps_message_to_text() {
        let message = ClientMessage::from_json_str(r#"{"type":"chat","message":"hi"}"#)
            .expect("valid chat");
        match into_command("p1".into(), message) {
            Some(Command::Chat {
                participant,
                text,
                emoji,
            }) => {
                assert_eq!(participant, "p1");
                assert_eq!(text.as_deref(), Some("hi"));
                assert_eq!(emoji, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_messages_produce_no_command() {
        assert!(into_command("p1".into(), ClientMessage::Unknown).is_none());
    }
}
