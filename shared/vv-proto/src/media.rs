//! Media Types
//!
//! Identifiers and descriptors exchanged during transport/producer/consumer
//! negotiation. ICE, DTLS and RTP payloads are opaque JSON blobs: the
//! signaling layer relays them between client and media engine verbatim and
//! never looks inside.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Room identifier (opaque, client-chosen).
pub type RoomId = SmolStr;
/// User identifier (opaque, unique within a room).
pub type UserId = SmolStr;
/// Transport identifier allocated by the media engine.
pub type TransportId = SmolStr;
/// Producer identifier allocated by the media engine.
pub type ProducerId = SmolStr;
/// Consumer identifier allocated by the media engine.
pub type ConsumerId = SmolStr;

/// Router or device RTP capabilities (opaque).
pub type RtpCapabilities = serde_json::Value;
/// Per-producer/consumer RTP parameters (opaque).
pub type RtpParameters = serde_json::Value;
/// ICE parameters of a transport (opaque).
pub type IceParameters = serde_json::Value;
/// ICE candidate list of a transport (opaque).
pub type IceCandidates = serde_json::Value;
/// DTLS parameters of a transport (opaque).
pub type DtlsParameters = serde_json::Value;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl MediaKind {
    /// Wire representation of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(UnknownMediaKind(other.into())),
        }
    }
}

/// Error returned when parsing an unrecognized media kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media kind: {0}")]
pub struct UnknownMediaKind(pub SmolStr);

/// Direction a transport carries media in, from the client's point of view.
///
/// Recorded as convention metadata; the engine accepts produce and consume
/// calls on any connected transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Client-to-server media (producing).
    Send,
    /// Server-to-client media (consuming).
    Recv,
}

impl TransportDirection {
    /// Wire representation of the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Recv => "recv",
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a client needs to complete the DTLS/ICE handshake for one
/// transport, relayed from the media engine verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    /// Engine-allocated transport id.
    pub id: TransportId,
    /// ICE parameters.
    pub ice_parameters: IceParameters,
    /// ICE candidates.
    pub ice_candidates: IceCandidates,
    /// DTLS parameters.
    pub dtls_parameters: DtlsParameters,
}

/// Everything a client needs to attach one forwarded media stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    /// Engine-allocated consumer id.
    pub id: ConsumerId,
    /// Producer this consumer forwards.
    pub producer_id: ProducerId,
    /// Kind of the forwarded track.
    pub kind: MediaKind,
    /// RTP parameters for the receiving end.
    pub rtp_parameters: RtpParameters,
    /// Engine consumer type (e.g. `simple`, `simulcast`).
    #[serde(rename = "type")]
    pub consumer_type: SmolStr,
    /// Whether the producer was paused at creation time. Consumers are
    /// created unpaused, so this stays `false` unless the engine says
    /// otherwise.
    pub producer_paused: bool,
}

/// A producer visible to other members of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    /// Producer id.
    pub producer_id: ProducerId,
    /// User publishing it.
    pub user_id: UserId,
    /// Kind of the published track.
    pub kind: MediaKind,
}
