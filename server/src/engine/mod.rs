//! Media Engine Boundary
//!
//! The narrow interface this server negotiates media through. Everything
//! RTP-related (codecs, ICE/DTLS, forwarding, bandwidth) lives behind it:
//! the production implementation relays calls to a co-deployed media worker
//! over HTTP, and a deterministic in-process stub backs development and
//! tests.

mod remote;
mod stub;

pub use remote::RemoteEngine;
pub use stub::StubEngine;

use async_trait::async_trait;
use vv_proto::{
    ConsumerDescriptor, ConsumerId, DtlsParameters, MediaKind, ProducerId, RtpCapabilities,
    RtpParameters, TransportDescriptor, TransportId,
};

/// A producer acknowledged by the engine.
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    /// Engine-allocated producer id.
    pub id: ProducerId,
    /// Kind the engine accepted.
    pub kind: MediaKind,
}

/// Errors surfaced by the media engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine has not finished starting up yet.
    #[error("media engine is not ready")]
    NotReady,

    /// The engine refused a negotiation step (bad parameters, unknown id).
    #[error("media engine rejected the request: {0}")]
    Rejected(String),

    /// The engine could not be reached.
    #[error("media engine unreachable: {0}")]
    Unreachable(String),

    /// The engine replied with something this server cannot interpret.
    #[error("malformed media engine reply: {0}")]
    Malformed(String),
}

/// Async interface to the SFU media engine.
///
/// Signaling relays ICE/DTLS/RTP payloads through these calls verbatim.
/// Close calls are infallible and idempotent: closing an id the engine no
/// longer knows is a no-op.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Router RTP capabilities clients load their device from.
    ///
    /// Returns [`EngineError::NotReady`] until engine startup completes.
    async fn router_capabilities(&self) -> Result<RtpCapabilities, EngineError>;

    /// Allocate a WebRTC transport.
    async fn create_transport(&self) -> Result<TransportDescriptor, EngineError>;

    /// Complete the DTLS handshake for a transport.
    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> Result<(), EngineError>;

    /// Start forwarding a client track into the SFU.
    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle, EngineError>;

    /// Whether `rtp_capabilities` can receive the producer's media.
    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<bool, EngineError>;

    /// Create an unpaused consumer forwarding `producer_id` over the given
    /// transport.
    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, EngineError>;

    /// Release a transport and everything riding on it.
    async fn close_transport(&self, transport_id: &TransportId);

    /// Release a producer.
    async fn close_producer(&self, producer_id: &ProducerId);

    /// Release a consumer.
    async fn close_consumer(&self, consumer_id: &ConsumerId);
}
