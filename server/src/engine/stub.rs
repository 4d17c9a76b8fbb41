//! Stub Media Engine
//!
//! Deterministic in-process engine used when no media worker is configured
//! and by the test suite. It allocates real ids, tracks which handles are
//! alive so closes cascade like the worker's do, and answers `can_consume`
//! with a kind-level capability check.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use smol_str::SmolStr;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use vv_proto::{
    ConsumerDescriptor, ConsumerId, DtlsParameters, MediaKind, ProducerId, RtpCapabilities,
    RtpParameters, TransportDescriptor, TransportId,
};

use super::{EngineError, MediaEngine, ProducerHandle};

struct StubProducer {
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    transport_id: TransportId,
}

struct StubConsumer {
    producer_id: ProducerId,
    transport_id: TransportId,
}

#[derive(Default)]
struct StubState {
    transports: HashMap<TransportId, bool>,
    producers: HashMap<ProducerId, StubProducer>,
    consumers: HashMap<ConsumerId, StubConsumer>,
}

/// In-process media engine with worker-shaped behavior and no actual media.
#[derive(Default)]
pub struct StubEngine {
    ready: AtomicBool,
    state: Mutex<StubState>,
}

impl StubEngine {
    /// Create a stub engine that is ready immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            state: Mutex::new(StubState::default()),
        }
    }

    /// Create a stub engine that reports `NotReady` until
    /// [`Self::set_ready`] is called, mimicking worker startup.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            ready: AtomicBool::new(false),
            state: Mutex::new(StubState::default()),
        }
    }

    /// Mark startup as complete.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    fn new_id() -> SmolStr {
        SmolStr::new(Uuid::now_v7().to_string())
    }

    /// Router capabilities the stub advertises: Opus audio and VP8 video,
    /// the same preferred set the media worker registers.
    fn router_caps() -> RtpCapabilities {
        json!({
            "codecs": [
                {
                    "kind": "audio",
                    "mimeType": "audio/opus",
                    "clockRate": 48000,
                    "channels": 2,
                },
                {
                    "kind": "video",
                    "mimeType": "video/VP8",
                    "clockRate": 90000,
                },
            ],
            "headerExtensions": [],
        })
    }

    /// Kind-level compatibility: the capabilities must list at least one
    /// codec of the producer's kind.
    fn caps_support_kind(rtp_capabilities: &RtpCapabilities, kind: MediaKind) -> bool {
        rtp_capabilities
            .get("codecs")
            .and_then(|codecs| codecs.as_array())
            .is_some_and(|codecs| {
                codecs
                    .iter()
                    .any(|codec| codec.get("kind").and_then(|k| k.as_str()) == Some(kind.as_str()))
            })
    }
}

/// Handle counts, for tests asserting that torn negotiations and departures
/// release everything they allocated.
#[cfg(test)]
impl StubEngine {
    pub(crate) async fn live_transports(&self) -> usize {
        self.state.lock().await.transports.len()
    }

    pub(crate) async fn live_producers(&self) -> usize {
        self.state.lock().await.producers.len()
    }

    pub(crate) async fn live_consumers(&self) -> usize {
        self.state.lock().await.consumers.len()
    }
}

#[async_trait]
impl MediaEngine for StubEngine {
    async fn router_capabilities(&self) -> Result<RtpCapabilities, EngineError> {
        self.ensure_ready()?;
        Ok(Self::router_caps())
    }

    async fn create_transport(&self) -> Result<TransportDescriptor, EngineError> {
        self.ensure_ready()?;
        let id = Self::new_id();
        self.state.lock().await.transports.insert(id.clone(), false);
        Ok(TransportDescriptor {
            id,
            ice_parameters: json!({ "usernameFragment": Self::new_id(), "password": Self::new_id(), "iceLite": true }),
            ice_candidates: json!([]),
            dtls_parameters: json!({ "role": "auto", "fingerprints": [] }),
        })
    }

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        _dtls_parameters: &DtlsParameters,
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        match state.transports.get_mut(transport_id) {
            Some(connected) => {
                *connected = true;
                Ok(())
            }
            None => Err(EngineError::Rejected(format!(
                "unknown transport {transport_id}"
            ))),
        }
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle, EngineError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::Rejected(format!(
                "unknown transport {transport_id}"
            )));
        }
        let id = Self::new_id();
        state.producers.insert(
            id.clone(),
            StubProducer {
                kind,
                rtp_parameters,
                transport_id: transport_id.clone(),
            },
        );
        Ok(ProducerHandle { id, kind })
    }

    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<bool, EngineError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        let Some(producer) = state.producers.get(producer_id) else {
            return Ok(false);
        };
        Ok(Self::caps_support_kind(rtp_capabilities, producer.kind))
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, EngineError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::Rejected(format!(
                "unknown transport {transport_id}"
            )));
        }
        let Some(producer) = state.producers.get(producer_id) else {
            return Err(EngineError::Rejected(format!(
                "unknown producer {producer_id}"
            )));
        };
        if !Self::caps_support_kind(&rtp_capabilities, producer.kind) {
            return Err(EngineError::Rejected(format!(
                "capabilities cannot consume {} producer {producer_id}",
                producer.kind
            )));
        }
        let descriptor = ConsumerDescriptor {
            id: Self::new_id(),
            producer_id: producer_id.clone(),
            kind: producer.kind,
            rtp_parameters: producer.rtp_parameters.clone(),
            consumer_type: "simple".into(),
            producer_paused: false,
        };
        state.consumers.insert(
            descriptor.id.clone(),
            StubConsumer {
                producer_id: producer_id.clone(),
                transport_id: transport_id.clone(),
            },
        );
        Ok(descriptor)
    }

    async fn close_transport(&self, transport_id: &TransportId) {
        let mut state = self.state.lock().await;
        if state.transports.remove(transport_id).is_none() {
            debug!(transport_id = %transport_id, "Close for unknown transport");
            return;
        }
        state
            .producers
            .retain(|_, p| p.transport_id != *transport_id);
        state
            .consumers
            .retain(|_, c| c.transport_id != *transport_id);
    }

    async fn close_producer(&self, producer_id: &ProducerId) {
        let mut state = self.state.lock().await;
        if state.producers.remove(producer_id).is_none() {
            debug!(producer_id = %producer_id, "Close for unknown producer");
            return;
        }
        state.consumers.retain(|_, c| c.producer_id != *producer_id);
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) {
        let mut state = self.state.lock().await;
        if state.consumers.remove(consumer_id).is_none() {
            debug!(consumer_id = %consumer_id, "Close for unknown consumer");
        }
    }
}
