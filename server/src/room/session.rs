//! Session State
//!
//! Everything one user holds in one room: negotiated transports, published
//! producers, attached consumers, and the event channel of the connection
//! that joined (absent for sessions driven over the REST fallback, which
//! poll instead of receiving pushes).

use std::collections::HashMap;

use tokio::sync::mpsc;
use vv_proto::{
    ConsumerDescriptor, MediaKind, ProducerId, ProducerInfo, ServerEvent, TransportDirection,
    TransportId, UserId,
};

/// A transport negotiated by a session.
#[derive(Debug, Clone)]
pub struct TransportSeat {
    /// Engine-allocated id.
    pub id: TransportId,
    /// Direction the client asked for. Convention metadata only; nothing is
    /// enforced against it.
    pub direction: TransportDirection,
}

/// A producer published by a session.
#[derive(Debug, Clone)]
pub struct ProducerSeat {
    /// Engine-allocated id.
    pub id: ProducerId,
    /// Kind published.
    pub kind: MediaKind,
}

/// One user's presence in one room.
pub struct Session {
    /// Owning user.
    pub user_id: UserId,
    /// Event channel of the joined connection, if any.
    pub events: Option<mpsc::Sender<ServerEvent>>,
    /// Transports keyed by id.
    pub transports: HashMap<TransportId, TransportSeat>,
    /// Producers in publish order.
    pub producers: Vec<ProducerSeat>,
    /// Consumers keyed by the producer they forward. The key choice is what
    /// makes repeat subscriptions idempotent and producer-close cleanup a
    /// single map lookup.
    pub consumers: HashMap<ProducerId, ConsumerDescriptor>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new(user_id: UserId, events: Option<mpsc::Sender<ServerEvent>>) -> Self {
        Self {
            user_id,
            events,
            transports: HashMap::new(),
            producers: Vec::new(),
            consumers: HashMap::new(),
        }
    }

    /// The session's producers as announced to other members.
    #[must_use]
    pub fn producer_infos(&self) -> Vec<ProducerInfo> {
        self.producers
            .iter()
            .map(|seat| ProducerInfo {
                producer_id: seat.id.clone(),
                user_id: self.user_id.clone(),
                kind: seat.kind,
            })
            .collect()
    }

    /// Kind of a producer owned by this session.
    #[must_use]
    pub fn producer_kind(&self, producer_id: &ProducerId) -> Option<MediaKind> {
        self.producers
            .iter()
            .find(|seat| seat.id == *producer_id)
            .map(|seat| seat.kind)
    }
}
