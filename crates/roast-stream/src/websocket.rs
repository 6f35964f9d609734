//! WebSocket endpoint for real-time roast data streaming.
//!
//! Protocol: a client connects to `/live/{machine_id}`. The server pushes
//! `ServerMessage` frames (temperature samples, state transitions, control
//! acknowledgements) and accepts `ClientMessage` frames (control writes,
//! session commands) as JSON text frames.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use roast_common::{ClientMessage, ServerMessage};
use roast_manager::MachineManager;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// `GET /live/{machine_id}`
pub async fn live_handler(
    ws: WebSocketUpgrade,
    Path(machine_id): Path<String>,
    Extension(manager): Extension<Arc<MachineManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, machine_id, manager))
}

async fn handle_socket(socket: WebSocket, machine_id: String, manager: Arc<MachineManager>) {
    let (mut sender, mut receiver) = socket.split();

    let Some((observer_id, mut observer_rx)) = manager.add_observer(&machine_id).await else {
        send_error(
            &mut sender,
            "MACHINE_NOT_FOUND",
            &format!("machine '{machine_id}' is not connected"),
            false,
        )
        .await;
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4004,
                reason: Cow::Borrowed("machine not connected"),
            })))
            .await;
        return;
    };

    let (driver_state, driver_name) = manager.driver_status(&machine_id).await.unwrap_or_default();
    if send_message(
        &mut sender,
        &ServerMessage::Connection {
            driver_state,
            driver_name,
            message: String::new(),
        },
    )
    .await
    .is_err()
    {
        manager.remove_observer(&machine_id, observer_id).await;
        return;
    }

    if let Some(state) = manager.session_state(&machine_id).await {
        let _ = send_message(
            &mut sender,
            &ServerMessage::State {
                state,
                previous_state: String::new(),
            },
        )
        .await;
    }

    loop {
        tokio::select! {
            frame = observer_rx.recv() => {
                match frame {
                    Some(msg) => {
                        if send_message(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&mut sender, &manager, &machine_id, observer_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%machine_id, "observer closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%machine_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    manager.remove_observer(&machine_id, observer_id).await;
}

async fn handle_client_text(
    sender: &mut SplitSink<WebSocket, Message>,
    manager: &Arc<MachineManager>,
    machine_id: &str,
    observer_id: u64,
    text: &str,
) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    match parsed {
        Ok(ClientMessage::Control { channel, value, enabled }) => {
            if !(0.0..=1.0).contains(&value) {
                send_error(
                    sender,
                    "INVALID_MESSAGE",
                    &format!("control value must be in [0, 1], got {value}"),
                    true,
                )
                .await;
                return;
            }
            if let Some(ack) = manager.handle_control(machine_id, &channel, value, enabled).await {
                let _ = send_message(sender, &ack).await;
            }
        }
        Ok(ClientMessage::Command { action, event_type, since_ms }) => {
            if action == "sync" {
                let since = since_ms.unwrap_or(0.0);
                if let Some(samples) = manager.get_sync_messages(machine_id, since).await {
                    for sample in samples {
                        if send_message(sender, &sample).await.is_err() {
                            return;
                        }
                    }
                }
                return;
            }

            let Some(reply) = manager
                .handle_session_command(machine_id, &action, event_type.as_deref())
                .await
            else {
                return;
            };

            if matches!(reply, ServerMessage::State { .. }) {
                manager.broadcast_except(machine_id, observer_id, reply.clone()).await;
            }
            let _ = send_message(sender, &reply).await;
        }
        Err(_) => {
            send_error(sender, "INVALID_MESSAGE", &format!("unparseable message: {text}"), true).await;
        }
    }
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(json.into())).await
}

async fn send_error(sender: &mut SplitSink<WebSocket, Message>, code: &str, message: &str, recoverable: bool) {
    let _ = send_message(
        sender,
        &ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            recoverable,
        },
    )
    .await;
}
