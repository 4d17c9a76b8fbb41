//! Client Errors

use crate::media::MediaBridgeError;

/// Errors surfaced by the meeting agent.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The WebSocket connection could not be established or broke.
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection to the server is gone.
    #[error("connection closed")]
    Disconnected,

    /// The local media stack failed.
    #[error(transparent)]
    Bridge(#[from] MediaBridgeError),

    /// The server answered a command with an error event.
    #[error("server error {code}: {message}")]
    Server {
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The server broke the protocol's request/reply shape.
    #[error("protocol violation: {0}")]
    Protocol(String),
}
