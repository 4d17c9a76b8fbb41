//! Media Bridge
//!
//! The seam between signaling and the local media stack. Everything that
//! touches devices, DTLS handshakes or decoded frames sits behind the
//! [`MediaBridge`] trait; the session only moves descriptors across it.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;
use vv_proto::{
    ConsumerDescriptor, DtlsParameters, MediaKind, ProducerId, RtpCapabilities, RtpParameters,
    TransportDescriptor, UserId,
};

/// A local track the agent wants to publish.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    /// Track kind.
    pub kind: MediaKind,
    /// RTP parameters describing the encoded track.
    pub rtp_parameters: RtpParameters,
}

/// Errors from the local media stack.
#[derive(Debug, thiserror::Error)]
pub enum MediaBridgeError {
    /// The device could not load the router capabilities.
    #[error("failed to load media device: {0}")]
    Load(String),

    /// A transport handshake failed locally.
    #[error("transport negotiation failed: {0}")]
    Negotiation(String),

    /// A forwarded track could not be attached.
    #[error("failed to attach consumer: {0}")]
    Attach(String),
}

/// The local media stack, as the session sees it.
///
/// Implementations own device loading, the actual ICE/DTLS handshakes and
/// track playout. The session guarantees single-threaded use: no two calls
/// for the same session run concurrently.
#[async_trait]
pub trait MediaBridge: Send + Sync {
    /// Load the device against the router's capabilities. Called once,
    /// before any transport work.
    async fn load(&self, router_capabilities: RtpCapabilities) -> Result<(), MediaBridgeError>;

    /// The device's RTP capabilities, sent with every consume request.
    /// Only meaningful after [`Self::load`].
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Start the local side of the send transport, returning the DTLS
    /// parameters to relay to the server.
    async fn bind_send_transport(
        &self,
        transport: &TransportDescriptor,
    ) -> Result<DtlsParameters, MediaBridgeError>;

    /// Start the local side of the receive transport.
    async fn bind_recv_transport(
        &self,
        transport: &TransportDescriptor,
    ) -> Result<DtlsParameters, MediaBridgeError>;

    /// Tracks to publish once the send transport is connected.
    fn outgoing_tracks(&self) -> Vec<LocalTrack>;

    /// Attach a forwarded peer track.
    async fn attach_consumer(
        &self,
        owner: &UserId,
        consumer: &ConsumerDescriptor,
    ) -> Result<(), MediaBridgeError>;

    /// Detach the consumer bound to `producer_id`. Unknown ids are a no-op.
    async fn detach_consumer(&self, producer_id: &ProducerId);

    /// Release every device and handle. Called on teardown, always.
    async fn close(&self);
}

/// A media bridge with no actual media: accepts whatever the router offers,
/// answers handshakes with canned parameters and tracks attachments in
/// memory. Used by headless agents and the test suite.
#[derive(Default)]
pub struct HeadlessBridge {
    tracks: Vec<LocalTrack>,
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    capabilities: Option<RtpCapabilities>,
    attached: HashSet<ProducerId>,
}

impl HeadlessBridge {
    /// Create a bridge that publishes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bridge that publishes the given tracks.
    #[must_use]
    pub fn with_tracks(tracks: Vec<LocalTrack>) -> Self {
        Self {
            tracks,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Producers currently attached.
    pub fn attached(&self) -> HashSet<ProducerId> {
        self.state.lock().map(|s| s.attached.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MediaBridge for HeadlessBridge {
    async fn load(&self, router_capabilities: RtpCapabilities) -> Result<(), MediaBridgeError> {
        if let Ok(mut state) = self.state.lock() {
            state.capabilities = Some(router_capabilities);
        }
        Ok(())
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        // A headless agent accepts everything the router offers.
        self.state
            .lock()
            .ok()
            .and_then(|s| s.capabilities.clone())
            .unwrap_or_else(|| json!({ "codecs": [] }))
    }

    async fn bind_send_transport(
        &self,
        _transport: &TransportDescriptor,
    ) -> Result<DtlsParameters, MediaBridgeError> {
        Ok(json!({ "role": "client", "fingerprints": [] }))
    }

    async fn bind_recv_transport(
        &self,
        _transport: &TransportDescriptor,
    ) -> Result<DtlsParameters, MediaBridgeError> {
        Ok(json!({ "role": "client", "fingerprints": [] }))
    }

    fn outgoing_tracks(&self) -> Vec<LocalTrack> {
        self.tracks.clone()
    }

    async fn attach_consumer(
        &self,
        owner: &UserId,
        consumer: &ConsumerDescriptor,
    ) -> Result<(), MediaBridgeError> {
        debug!(owner = %owner, consumer_id = %consumer.id, "Attached consumer");
        if let Ok(mut state) = self.state.lock() {
            state.attached.insert(consumer.producer_id.clone());
        }
        Ok(())
    }

    async fn detach_consumer(&self, producer_id: &ProducerId) {
        if let Ok(mut state) = self.state.lock() {
            state.attached.remove(producer_id);
        }
    }

    async fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.attached.clear();
        }
    }
}
