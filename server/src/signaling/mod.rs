//! Signaling Carriers
//!
//! The negotiation protocol rides two carriers: a persistent WebSocket
//! channel (primary, push-capable) handled here, and a REST fallback for
//! clients without one (see `http`). Both dispatch into the same handler
//! core, so carrier choice never changes semantics.

pub mod error;
pub mod handler;
pub mod http;

pub use error::SignalError;

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vv_proto::{ClientCommand, RoomId, ServerEvent, UserId};

use crate::api::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Handle one signaling connection.
async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending events to the WebSocket. Replies and room pushes
    // both go through it, so one session sees one ordered stream.
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.config.event_buffer);

    info!(addr = %addr, "Signaling connection established");

    // Forward events to the WebSocket
    let sender_handle: tokio::task::JoinHandle<()> = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let msg = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Sessions this connection joined, for disconnect cleanup.
    let mut joined: HashSet<(RoomId, UserId)> = HashSet::new();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_client_command(&text, &state, &tx, &mut joined).await {
                    warn!(code = e.code(), error = %e, "Signaling command failed");
                    let _ = tx
                        .send(ServerEvent::Error {
                            code: e.code().to_string(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Signaling connection closed by client");
                break;
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    sender_handle.abort();

    // Disconnect is the cancellation signal: tear down every session this
    // connection still held. Leave is idempotent, so an explicit leave that
    // already ran makes this a no-op.
    for (room_id, user_id) in joined {
        handler::leave(&state.engine, &state.rooms, &room_id, &user_id).await;
    }

    info!(addr = %addr, "Signaling connection closed");
}

/// Parse and dispatch one client command, sending the direct reply.
async fn handle_client_command(
    text: &str,
    state: &AppState,
    tx: &mpsc::Sender<ServerEvent>,
    joined: &mut HashSet<(RoomId, UserId)>,
) -> Result<(), SignalError> {
    let command: ClientCommand = serde_json::from_str(text)
        .map_err(|e| SignalError::Validation(format!("malformed command: {e}")))?;

    match command {
        ClientCommand::GetCapabilities => {
            let rtp_capabilities = handler::get_capabilities(&state.engine).await?;
            send(tx, ServerEvent::Capabilities { rtp_capabilities }).await
        }
        ClientCommand::JoinRoom { room_id, user_id } => {
            let producers =
                handler::join_room(&state.rooms, &room_id, &user_id, tx.clone()).await?;
            joined.insert((room_id.clone(), user_id));
            send(tx, ServerEvent::ExistingProducers { room_id, producers }).await
        }
        ClientCommand::CreateTransport {
            room_id,
            user_id,
            direction,
        } => {
            let transport = handler::create_transport(
                &state.engine,
                &state.rooms,
                &room_id,
                &user_id,
                direction,
            )
            .await?;
            // First contact created the session, so disconnect cleanup
            // covers it from here on even if the client never joins.
            joined.insert((room_id.clone(), user_id));
            send(
                tx,
                ServerEvent::TransportCreated {
                    room_id,
                    direction,
                    transport,
                },
            )
            .await
        }
        ClientCommand::ConnectTransport {
            room_id,
            transport_id,
            dtls_parameters,
        } => {
            handler::connect_transport(
                &state.engine,
                &state.rooms,
                &room_id,
                &transport_id,
                &dtls_parameters,
            )
            .await?;
            send(
                tx,
                ServerEvent::TransportConnected {
                    room_id,
                    transport_id,
                },
            )
            .await
        }
        ClientCommand::Produce {
            room_id,
            user_id,
            transport_id,
            kind,
            rtp_parameters,
        } => {
            let (producer_id, kind) = handler::produce(
                &state.engine,
                &state.rooms,
                &room_id,
                &user_id,
                &transport_id,
                kind,
                rtp_parameters,
            )
            .await?;
            send(
                tx,
                ServerEvent::Produced {
                    room_id,
                    producer_id,
                    kind,
                },
            )
            .await
        }
        ClientCommand::Consume {
            room_id,
            user_id,
            transport_id,
            producer_id,
            rtp_capabilities,
        } => {
            let consumer = handler::consume(
                &state.engine,
                &state.rooms,
                &room_id,
                &user_id,
                &transport_id,
                &producer_id,
                rtp_capabilities,
            )
            .await?;
            send(tx, ServerEvent::Consumed { room_id, consumer }).await
        }
        ClientCommand::Leave { room_id, user_id } => {
            handler::leave(&state.engine, &state.rooms, &room_id, &user_id).await;
            joined.remove(&(room_id.clone(), user_id));
            send(tx, ServerEvent::Left { room_id }).await
        }
    }
}

async fn send(tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Result<(), SignalError> {
    tx.send(event)
        .await
        .map_err(|e| SignalError::Internal(e.to_string()))
}
