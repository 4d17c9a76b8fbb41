//! Remote Media Engine
//!
//! Relays every engine call to a co-deployed media worker over HTTP. The
//! worker owns the mediasoup-style router; this side performs a startup
//! handshake that caches the router capabilities and keeps reporting
//! `NotReady` until the worker answers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vv_proto::{
    ConsumerDescriptor, ConsumerId, DtlsParameters, MediaKind, ProducerId, RtpCapabilities,
    RtpParameters, TransportDescriptor, TransportId,
};

use super::{EngineError, MediaEngine, ProducerHandle};

/// Longest pause between handshake retries.
const HANDSHAKE_BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterReply {
    rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Deserialize)]
struct ProduceReply {
    id: ProducerId,
    kind: MediaKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanConsumeReply {
    can_consume: bool,
}

/// Media engine backed by an external worker process.
pub struct RemoteEngine {
    http: reqwest::Client,
    base_url: String,
    /// Router capabilities cached by the startup handshake. `None` means
    /// the worker has not answered yet and every call reports `NotReady`.
    router: RwLock<Option<RtpCapabilities>>,
}

impl RemoteEngine {
    /// Create an engine client for the worker at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            router: RwLock::new(None),
        })
    }

    /// Run the startup handshake in the background, retrying with backoff
    /// until the worker answers.
    pub fn spawn_handshake(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match engine.fetch_router().await {
                    Ok(caps) => {
                        *engine.router.write().await = Some(caps);
                        info!(url = %engine.base_url, "Media engine ready");
                        return;
                    }
                    Err(e) => {
                        warn!(url = %engine.base_url, error = %e, "Media engine handshake failed, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(HANDSHAKE_BACKOFF_CAP);
                    }
                }
            }
        });
    }

    async fn fetch_router(&self) -> Result<RtpCapabilities, EngineError> {
        let reply: RouterReply = self
            .request(self.http.get(self.url("/v1/router")))
            .await?;
        Ok(reply.rtp_capabilities)
    }

    async fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.router.read().await.is_some() {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and decode the JSON reply, mapping transport, status
    /// and decode failures onto [`EngineError`].
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, EngineError> {
        let resp = req
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(EngineError::Rejected(format!("HTTP {status}: {detail}")));
        }
        resp.json::<T>()
            .await
            .map_err(|e| EngineError::Malformed(e.to_string()))
    }

    /// Fire a close request, swallowing every failure. The worker treats
    /// closes of unknown ids as no-ops and so do we.
    async fn close(&self, path: String) {
        match self.http.delete(self.url(&path)).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => debug!(path, status = %resp.status(), "Close ignored by media engine"),
            Err(e) => debug!(path, error = %e, "Close did not reach media engine"),
        }
    }
}

#[async_trait]
impl MediaEngine for RemoteEngine {
    async fn router_capabilities(&self) -> Result<RtpCapabilities, EngineError> {
        self.router
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotReady)
    }

    async fn create_transport(&self) -> Result<TransportDescriptor, EngineError> {
        self.ensure_ready().await?;
        self.request(self.http.post(self.url("/v1/transports")))
            .await
    }

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> Result<(), EngineError> {
        self.ensure_ready().await?;
        let _: serde_json::Value = self
            .request(
                self.http
                    .post(self.url(&format!("/v1/transports/{transport_id}/connect")))
                    .json(&json!({ "dtlsParameters": dtls_parameters })),
            )
            .await?;
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle, EngineError> {
        self.ensure_ready().await?;
        let reply: ProduceReply = self
            .request(
                self.http
                    .post(self.url(&format!("/v1/transports/{transport_id}/producers")))
                    .json(&json!({ "kind": kind, "rtpParameters": rtp_parameters })),
            )
            .await?;
        Ok(ProducerHandle {
            id: reply.id,
            kind: reply.kind,
        })
    }

    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<bool, EngineError> {
        self.ensure_ready().await?;
        let reply: CanConsumeReply = self
            .request(
                self.http
                    .post(self.url(&format!("/v1/producers/{producer_id}/can-consume")))
                    .json(&json!({ "rtpCapabilities": rtp_capabilities })),
            )
            .await?;
        Ok(reply.can_consume)
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerDescriptor, EngineError> {
        self.ensure_ready().await?;
        self.request(
            self.http
                .post(self.url(&format!("/v1/transports/{transport_id}/consumers")))
                .json(&json!({
                    "producerId": producer_id,
                    "rtpCapabilities": rtp_capabilities,
                })),
        )
        .await
    }

    async fn close_transport(&self, transport_id: &TransportId) {
        self.close(format!("/v1/transports/{transport_id}")).await;
    }

    async fn close_producer(&self, producer_id: &ProducerId) {
        self.close(format!("/v1/producers/{producer_id}")).await;
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) {
        self.close(format!("/v1/consumers/{consumer_id}")).await;
    }
}
