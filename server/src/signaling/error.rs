//! Signaling Errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use vv_proto::{codes, ProducerId, RoomId, TransportId};

use crate::engine::EngineError;

/// Errors that can occur during signaling operations. All of them are
/// recoverable protocol outcomes: the connection that triggered one stays
/// up and receives the error as a reply.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Media engine still starting up.
    #[error("Media engine is not ready yet")]
    EngineNotReady,

    /// Room not found.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// Transport not found in the room.
    #[error("Transport not found: {0}")]
    TransportNotFound(TransportId),

    /// Producer not found in the room.
    #[error("Producer not found: {0}")]
    ProducerNotFound(ProducerId),

    /// The requester's capabilities cannot receive the producer's media.
    #[error("Capabilities cannot consume producer: {0}")]
    CannotConsume(ProducerId),

    /// The media engine rejected a negotiation step.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// User already has a live session in the room.
    #[error("Already joined this room")]
    AlreadyJoined,

    /// Request failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Stable code reported on both carriers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EngineNotReady => codes::ENGINE_NOT_READY,
            Self::RoomNotFound(_) => codes::ROOM_NOT_FOUND,
            Self::TransportNotFound(_) => codes::TRANSPORT_NOT_FOUND,
            Self::ProducerNotFound(_) => codes::PRODUCER_NOT_FOUND,
            Self::CannotConsume(_) => codes::CANNOT_CONSUME,
            Self::NegotiationFailed(_) => codes::NEGOTIATION_FAILED,
            Self::AlreadyJoined => codes::ALREADY_JOINED,
            Self::Validation(_) => codes::VALIDATION_ERROR,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::EngineNotReady => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Self::RoomNotFound(_) | Self::TransportNotFound(_) | Self::ProducerNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Self::CannotConsume(_) | Self::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::NegotiationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::AlreadyJoined => (StatusCode::CONFLICT, self.to_string()),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for SignalError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotReady => Self::EngineNotReady,
            EngineError::Rejected(detail) => Self::NegotiationFailed(detail),
            EngineError::Unreachable(detail) | EngineError::Malformed(detail) => {
                Self::Internal(detail)
            }
        }
    }
}
