//! WebSocket Connection
//!
//! Opens the signaling channel and pumps it: outbound commands are
//! serialized onto the wire, inbound frames are decoded into server events.
//! There is no implicit reconnection; when the socket drops, the event
//! receiver closes and the session surfaces `Disconnected`. The server has
//! already torn the old session down, so the embedder starts a fresh one.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use vv_proto::{ClientCommand, ServerEvent};

use crate::error::ClientError;

/// Channel capacity in each direction.
const CHANNEL_CAPACITY: usize = 100;

/// An open signaling connection.
pub struct Socket {
    /// Commands queued here are written to the wire in order.
    pub commands: mpsc::Sender<ClientCommand>,
    /// Decoded server events, replies and room pushes interleaved.
    pub events: mpsc::Receiver<ServerEvent>,
    /// The pump task. Ends when either side closes the connection.
    pub pump: JoinHandle<()>,
}

/// Connect to a server's signaling endpoint.
///
/// Accepts an `http(s)://` or `ws(s)://` base URL; the `/ws` path is
/// appended.
pub async fn connect(server_url: &str) -> Result<Socket, ClientError> {
    let url = url::Url::parse(&ws_url(server_url))
        .map_err(|e| ClientError::Protocol(format!("invalid server url: {e}")))?;

    let (stream, _) = connect_async(url.as_str()).await?;
    info!(url = %url, "Signaling connection established");

    let (mut write, mut read) = stream.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(CHANNEL_CAPACITY);

    let pump = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Handle incoming frames
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    if event_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "Failed to parse server event");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!(error = %e, "Failed to send pong");
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Server closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                // Handle outgoing commands
                command = cmd_rx.recv() => {
                    match command {
                        Some(command) => {
                            let json = match serde_json::to_string(&command) {
                                Ok(json) => json,
                                Err(e) => {
                                    error!(error = %e, "Failed to serialize command");
                                    continue;
                                }
                            };
                            debug!(command = %json, "Sending");
                            if let Err(e) = write.send(Message::Text(json.into())).await {
                                error!(error = %e, "Failed to send command");
                                break;
                            }
                        }
                        None => {
                            // Every sender dropped; say goodbye.
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(Socket {
        commands: cmd_tx,
        events: event_rx,
        pump,
    })
}

/// Build the WebSocket URL from an HTTP or WS base URL.
fn ws_url(server_url: &str) -> String {
    let base = server_url
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!("{}/ws", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_rewrites_scheme_and_appends_path() {
        assert_eq!(ws_url("http://localhost:8080"), "ws://localhost:8080/ws");
        assert_eq!(ws_url("https://meet.example.org/"), "wss://meet.example.org/ws");
        assert_eq!(ws_url("ws://localhost:8080"), "ws://localhost:8080/ws");
    }
}
