//! Signaling Messages
//!
//! The command/event enums carried over the persistent signaling channel,
//! tagged by a `type` field. Tag values are kebab-case and payload fields
//! camelCase, matching the mediasoup-style clients this protocol
//! interoperates with.

use serde::{Deserialize, Serialize};

use crate::media::{
    ConsumerDescriptor, DtlsParameters, MediaKind, ProducerId, ProducerInfo, RoomId,
    RtpCapabilities, RtpParameters, TransportDescriptor, TransportDirection, TransportId, UserId,
};

/// Stable error codes reported in [`ServerEvent::Error`] and in REST error
/// bodies.
pub mod codes {
    /// The media engine has not finished starting up.
    pub const ENGINE_NOT_READY: &str = "ENGINE_NOT_READY";
    /// The referenced room does not exist.
    pub const ROOM_NOT_FOUND: &str = "ROOM_NOT_FOUND";
    /// The referenced transport does not exist in the room.
    pub const TRANSPORT_NOT_FOUND: &str = "TRANSPORT_NOT_FOUND";
    /// The referenced producer does not exist in the room.
    pub const PRODUCER_NOT_FOUND: &str = "PRODUCER_NOT_FOUND";
    /// The requester's capabilities cannot receive the producer's media.
    pub const CANNOT_CONSUME: &str = "CANNOT_CONSUME";
    /// The media engine rejected a negotiation step.
    pub const NEGOTIATION_FAILED: &str = "NEGOTIATION_FAILED";
    /// The user already has a live session in the room.
    pub const ALREADY_JOINED: &str = "ALREADY_JOINED";
    /// The request failed validation.
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// Unexpected server-side failure.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Commands sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Fetch the router RTP capabilities.
    GetCapabilities,
    /// Enter a room and subscribe to membership events. The reply is an
    /// [`ServerEvent::ExistingProducers`] snapshot of everyone else's media.
    JoinRoom {
        /// Target room.
        room_id: RoomId,
        /// Joining user.
        user_id: UserId,
    },
    /// Allocate a WebRTC transport.
    CreateTransport {
        /// Target room.
        room_id: RoomId,
        /// Owning user.
        user_id: UserId,
        /// Intended media direction.
        direction: TransportDirection,
    },
    /// Finish the DTLS handshake for a transport.
    ConnectTransport {
        /// Target room.
        room_id: RoomId,
        /// Transport to connect.
        transport_id: TransportId,
        /// Client DTLS parameters.
        dtls_parameters: DtlsParameters,
    },
    /// Publish a local track.
    Produce {
        /// Target room.
        room_id: RoomId,
        /// Publishing user.
        user_id: UserId,
        /// Send transport to publish over.
        transport_id: TransportId,
        /// Track kind.
        kind: MediaKind,
        /// Track RTP parameters.
        rtp_parameters: RtpParameters,
    },
    /// Subscribe to another user's producer.
    Consume {
        /// Target room.
        room_id: RoomId,
        /// Subscribing user.
        user_id: UserId,
        /// Receive transport to subscribe over.
        transport_id: TransportId,
        /// Producer to forward.
        producer_id: ProducerId,
        /// Subscriber's device RTP capabilities.
        rtp_capabilities: RtpCapabilities,
    },
    /// Leave a room, releasing every transport, producer and consumer.
    Leave {
        /// Target room.
        room_id: RoomId,
        /// Leaving user.
        user_id: UserId,
    },
}

/// Events sent from server to client: direct replies to commands plus
/// membership pushes fanned out to the rest of the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Reply to [`ClientCommand::GetCapabilities`].
    Capabilities {
        /// Router RTP capabilities.
        rtp_capabilities: RtpCapabilities,
    },
    /// Reply to [`ClientCommand::JoinRoom`]: every other member's producers
    /// at the moment of joining.
    ExistingProducers {
        /// Room joined.
        room_id: RoomId,
        /// Snapshot of live producers, excluding the joiner's own.
        producers: Vec<ProducerInfo>,
    },
    /// Reply to [`ClientCommand::CreateTransport`].
    TransportCreated {
        /// Room the transport belongs to.
        room_id: RoomId,
        /// Direction requested.
        direction: TransportDirection,
        /// Engine transport descriptor, relayed verbatim.
        transport: TransportDescriptor,
    },
    /// Reply to [`ClientCommand::ConnectTransport`].
    TransportConnected {
        /// Room the transport belongs to.
        room_id: RoomId,
        /// Transport that finished its handshake.
        transport_id: TransportId,
    },
    /// Reply to [`ClientCommand::Produce`].
    Produced {
        /// Room the producer belongs to.
        room_id: RoomId,
        /// Engine-allocated producer id.
        producer_id: ProducerId,
        /// Kind published.
        kind: MediaKind,
    },
    /// Reply to [`ClientCommand::Consume`].
    Consumed {
        /// Room the consumer belongs to.
        room_id: RoomId,
        /// Engine consumer descriptor, relayed verbatim.
        consumer: ConsumerDescriptor,
    },
    /// Push: another member published a track.
    NewProducer {
        /// Room it happened in.
        room_id: RoomId,
        /// The new producer.
        producer_id: ProducerId,
        /// Publishing user.
        user_id: UserId,
        /// Kind published.
        kind: MediaKind,
    },
    /// Push: a producer went away (its owner left or disconnected).
    ProducerClosed {
        /// Room it happened in.
        room_id: RoomId,
        /// The closed producer.
        producer_id: ProducerId,
    },
    /// Reply to [`ClientCommand::Leave`].
    Left {
        /// Room left.
        room_id: RoomId,
    },
    /// A command failed. The channel stays open; the client decides whether
    /// the failure is fatal for its session.
    Error {
        /// Stable error code from [`codes`].
        code: String,
        /// Human-readable detail.
        message: String,
    },
}
