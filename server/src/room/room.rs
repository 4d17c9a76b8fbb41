//! Room State
//!
//! One lock per room serializes the session map, the transport and producer
//! indexes, and the join epoch. Every mutation that must be atomic with the
//! events it triggers (join + snapshot, produce + announce, leave + close
//! fan-out) captures its outcome inside that critical section; actual sends
//! happen after the lock is released.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use vv_proto::{
    ConsumerDescriptor, ConsumerId, MediaKind, ProducerId, ProducerInfo, RoomId, ServerEvent,
    TransportDirection, TransportId, UserId,
};

use super::session::{ProducerSeat, Session, TransportSeat};
use crate::signaling::SignalError;

/// Connections an event must reach, captured inside the critical section
/// that produced the event so each membership change lands in exactly one
/// snapshot or push per member.
pub type Recipients = Vec<(UserId, mpsc::Sender<ServerEvent>)>;

struct RoomInner {
    sessions: HashMap<UserId, Session>,
    /// Transport id to owning user, kept in step with the session seats.
    transport_owners: HashMap<TransportId, UserId>,
    /// Producer id to owning user, kept in step with the session seats.
    producer_owners: HashMap<ProducerId, UserId>,
    /// Bumped whenever a session registers. A scheduled disposal only fires
    /// if the epoch it captured is still current.
    epoch: u64,
}

/// Everything a removed session held, for the caller to close and announce.
pub struct RemovedSession {
    /// The session's transports.
    pub transports: Vec<TransportId>,
    /// The session's producers, in publish order.
    pub producers: Vec<ProducerSeat>,
    /// The session's own consumers.
    pub consumers: Vec<ConsumerId>,
    /// Other sessions' consumers that forwarded the removed producers,
    /// already detached from their sessions.
    pub swept_consumers: Vec<ConsumerId>,
    /// Remaining connected members, for the producer-closed fan-out.
    pub recipients: Recipients,
    /// Whether the room has no sessions left.
    pub now_empty: bool,
    /// Epoch at removal time, for disposal scheduling.
    pub epoch: u64,
}

/// Outcome of storing a consumer after the engine call returned.
pub enum ConsumerAdded {
    /// Stored; the consumer is now part of the session.
    Inserted,
    /// An identical subscription raced ahead; the stored descriptor wins
    /// and the fresh engine consumer must be closed.
    Raced(ConsumerDescriptor),
    /// The subscriber left while the engine call was in flight.
    SessionGone,
    /// The producer closed while the engine call was in flight.
    ProducerGone,
}

/// A single meeting room and every session in it.
pub struct Room {
    /// Room identifier.
    pub room_id: RoomId,
    inner: RwLock<RoomInner>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            inner: RwLock::new(RoomInner {
                sessions: HashMap::new(),
                transport_owners: HashMap::new(),
                producer_owners: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    /// Register `user_id` as a member and snapshot every other session's
    /// producers in the same critical section.
    ///
    /// A session pre-created by a transport allocation gets the event
    /// channel attached; a user with a live joined session is rejected.
    pub async fn join(
        &self,
        user_id: &UserId,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<Vec<ProducerInfo>, SignalError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        match inner.sessions.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                if session.events.is_some() {
                    return Err(SignalError::AlreadyJoined);
                }
                session.events = Some(events);
            }
            Entry::Vacant(entry) => {
                entry.insert(Session::new(user_id.clone(), Some(events)));
            }
        }
        inner.epoch += 1;

        Ok(snapshot_excluding(inner, user_id))
    }

    /// Record a transport for `user_id`, creating the session on first use
    /// (allocating a transport before joining is legal).
    pub async fn register_transport(&self, user_id: &UserId, seat: TransportSeat) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        inner
            .transport_owners
            .insert(seat.id.clone(), user_id.clone());
        if !inner.sessions.contains_key(user_id) {
            inner.epoch += 1;
        }
        let session = inner
            .sessions
            .entry(user_id.clone())
            .or_insert_with(|| Session::new(user_id.clone(), None));
        session.transports.insert(seat.id.clone(), seat);
    }

    /// Owner and direction of a transport, if the room knows it.
    pub async fn find_transport(
        &self,
        transport_id: &TransportId,
    ) -> Option<(UserId, TransportDirection)> {
        let inner = self.inner.read().await;
        let owner = inner.transport_owners.get(transport_id)?;
        let seat = inner.sessions.get(owner)?.transports.get(transport_id)?;
        Some((owner.clone(), seat.direction))
    }

    /// Store a producer for `user_id` and capture who must hear about it,
    /// atomically with respect to concurrent joins.
    ///
    /// Returns `None` when the session vanished while the engine call was
    /// in flight; the caller owns the orphaned engine handle.
    pub async fn add_producer(&self, user_id: &UserId, seat: ProducerSeat) -> Option<Recipients> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let session = inner.sessions.get_mut(user_id)?;
        let producer_id = seat.id.clone();
        session.producers.push(seat);
        inner
            .producer_owners
            .insert(producer_id, user_id.clone());

        Some(recipients_excluding(inner, user_id))
    }

    /// Owner and kind of a producer, if it is live. O(1) via the index.
    pub async fn lookup_producer(&self, producer_id: &ProducerId) -> Option<(UserId, MediaKind)> {
        let inner = self.inner.read().await;
        let owner = inner.producer_owners.get(producer_id)?;
        let kind = inner.sessions.get(owner)?.producer_kind(producer_id)?;
        Some((owner.clone(), kind))
    }

    /// The consumer `user_id` already holds for `producer_id`, if any.
    pub async fn stored_consumer(
        &self,
        user_id: &UserId,
        producer_id: &ProducerId,
    ) -> Option<ConsumerDescriptor> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(user_id)?
            .consumers
            .get(producer_id)
            .cloned()
    }

    /// Store a consumer after the engine call returned, revalidating what
    /// may have changed while it was in flight.
    pub async fn add_consumer(
        &self,
        user_id: &UserId,
        descriptor: ConsumerDescriptor,
    ) -> ConsumerAdded {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if !inner.producer_owners.contains_key(&descriptor.producer_id) {
            return ConsumerAdded::ProducerGone;
        }
        let Some(session) = inner.sessions.get_mut(user_id) else {
            return ConsumerAdded::SessionGone;
        };
        match session.consumers.entry(descriptor.producer_id.clone()) {
            Entry::Occupied(entry) => ConsumerAdded::Raced(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(descriptor);
                ConsumerAdded::Inserted
            }
        }
    }

    /// Producers of every session except `user_id`'s, for the polling
    /// fallback.
    pub async fn snapshot_except(&self, user_id: &UserId) -> Vec<ProducerInfo> {
        let inner = self.inner.read().await;
        snapshot_excluding(&inner, user_id)
    }

    /// Remove a session and everything it held. Consumers in other sessions
    /// that forwarded the removed producers are detached in the same
    /// critical section. Idempotent: `None` when no session exists.
    pub async fn remove_user(&self, user_id: &UserId) -> Option<RemovedSession> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let session = inner.sessions.remove(user_id)?;
        for transport_id in session.transports.keys() {
            inner.transport_owners.remove(transport_id);
        }
        for seat in &session.producers {
            inner.producer_owners.remove(&seat.id);
        }

        let mut swept_consumers = Vec::new();
        for other in inner.sessions.values_mut() {
            for seat in &session.producers {
                if let Some(descriptor) = other.consumers.remove(&seat.id) {
                    swept_consumers.push(descriptor.id);
                }
            }
        }

        let recipients = recipients_excluding(inner, user_id);
        Some(RemovedSession {
            transports: session.transports.into_keys().collect(),
            consumers: session
                .consumers
                .into_values()
                .map(|descriptor| descriptor.id)
                .collect(),
            producers: session.producers,
            swept_consumers,
            recipients,
            now_empty: inner.sessions.is_empty(),
            epoch: inner.epoch,
        })
    }

    /// Whether the room has no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Number of sessions in the room.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Current join epoch.
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }
}

fn snapshot_excluding(inner: &RoomInner, user_id: &UserId) -> Vec<ProducerInfo> {
    inner
        .sessions
        .values()
        .filter(|session| session.user_id != *user_id)
        .flat_map(|session| session.producer_infos())
        .collect()
}

fn recipients_excluding(inner: &RoomInner, user_id: &UserId) -> Recipients {
    inner
        .sessions
        .values()
        .filter(|session| session.user_id != *user_id)
        .filter_map(|session| {
            session
                .events
                .as_ref()
                .map(|tx| (session.user_id.clone(), tx.clone()))
        })
        .collect()
}

/// Deliver one event to recipients captured under the room lock. Sends run
/// without any lock held; a closed or full channel only logs.
pub async fn fan_out(recipients: &Recipients, event: &ServerEvent) {
    for (user_id, tx) in recipients {
        if let Err(e) = tx.send(event.clone()).await {
            warn!(user_id = %user_id, error = %e, "Failed to deliver room event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vv_proto::MediaKind;

    fn audio_seat(id: &str) -> ProducerSeat {
        ProducerSeat {
            id: id.into(),
            kind: MediaKind::Audio,
        }
    }

    fn consumer_for(producer_id: &str, consumer_id: &str) -> ConsumerDescriptor {
        ConsumerDescriptor {
            id: consumer_id.into(),
            producer_id: producer_id.into(),
            kind: MediaKind::Audio,
            rtp_parameters: serde_json::json!({}),
            consumer_type: "simple".into(),
            producer_paused: false,
        }
    }

    #[tokio::test]
    async fn join_snapshots_only_other_sessions() {
        let room = Room::new("r1".into());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);

        room.join(&"ada".into(), tx_a).await.unwrap();
        room.add_producer(&"ada".into(), audio_seat("p-ada"))
            .await
            .unwrap();

        let snapshot = room.join(&"bob".into(), tx_b).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].producer_id, "p-ada");
        assert_eq!(snapshot[0].user_id, "ada");

        // Ada's own producers never appear in her snapshots.
        assert!(room.snapshot_except(&"ada".into()).await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected_but_pre_created_sessions_attach() {
        let room = Room::new("r1".into());

        // A transport allocation before join creates a detached session.
        room.register_transport(
            &"ada".into(),
            TransportSeat {
                id: "t1".into(),
                direction: TransportDirection::Send,
            },
        )
        .await;

        let (tx, _rx) = mpsc::channel(8);
        room.join(&"ada".into(), tx).await.unwrap();

        let (tx2, _rx2) = mpsc::channel(8);
        assert!(matches!(
            room.join(&"ada".into(), tx2).await,
            Err(SignalError::AlreadyJoined)
        ));
    }

    #[tokio::test]
    async fn add_producer_reaches_every_other_connected_session_once() {
        let room = Room::new("r1".into());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        room.join(&"ada".into(), tx_a).await.unwrap();
        room.join(&"bob".into(), tx_b).await.unwrap();
        // A polling session has no event channel and is skipped.
        room.register_transport(
            &"carol".into(),
            TransportSeat {
                id: "t-carol".into(),
                direction: TransportDirection::Send,
            },
        )
        .await;

        let recipients = room
            .add_producer(&"ada".into(), audio_seat("p1"))
            .await
            .unwrap();
        let mut users: Vec<_> = recipients.iter().map(|(u, _)| u.clone()).collect();
        users.sort_unstable();
        assert_eq!(users, vec![UserId::from("bob")]);
    }

    #[tokio::test]
    async fn add_producer_after_removal_returns_none() {
        let room = Room::new("r1".into());
        let (tx, _rx) = mpsc::channel(8);
        room.join(&"ada".into(), tx).await.unwrap();
        room.remove_user(&"ada".into()).await.unwrap();

        assert!(room
            .add_producer(&"ada".into(), audio_seat("p1"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn remove_user_returns_every_handle_and_sweeps_consumers() {
        let room = Room::new("r1".into());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        room.join(&"ada".into(), tx_a).await.unwrap();
        room.join(&"bob".into(), tx_b).await.unwrap();

        room.register_transport(
            &"ada".into(),
            TransportSeat {
                id: "t-ada".into(),
                direction: TransportDirection::Send,
            },
        )
        .await;
        room.add_producer(&"ada".into(), audio_seat("p-ada"))
            .await
            .unwrap();

        // Bob consumes Ada's producer.
        match room
            .add_consumer(&"bob".into(), consumer_for("p-ada", "c-bob"))
            .await
        {
            ConsumerAdded::Inserted => {}
            _ => panic!("expected insert"),
        }

        let removed = room.remove_user(&"ada".into()).await.unwrap();
        assert_eq!(removed.transports, vec![TransportId::from("t-ada")]);
        assert_eq!(removed.producers.len(), 1);
        assert_eq!(removed.swept_consumers, vec![ConsumerId::from("c-bob")]);
        assert!(!removed.now_empty);
        assert_eq!(removed.recipients.len(), 1);

        // Bob's session no longer references the dead producer.
        assert!(room
            .stored_consumer(&"bob".into(), &"p-ada".into())
            .await
            .is_none());
        // The index is gone too.
        assert!(room.lookup_producer(&"p-ada".into()).await.is_none());

        // Removing an absent user is a no-op.
        assert!(room.remove_user(&"ada".into()).await.is_none());
    }

    #[tokio::test]
    async fn consumers_are_idempotent_per_producer() {
        let room = Room::new("r1".into());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        room.join(&"ada".into(), tx_a).await.unwrap();
        room.join(&"bob".into(), tx_b).await.unwrap();
        room.add_producer(&"ada".into(), audio_seat("p1"))
            .await
            .unwrap();

        match room
            .add_consumer(&"bob".into(), consumer_for("p1", "c1"))
            .await
        {
            ConsumerAdded::Inserted => {}
            _ => panic!("expected insert"),
        }
        match room
            .add_consumer(&"bob".into(), consumer_for("p1", "c2"))
            .await
        {
            ConsumerAdded::Raced(stored) => assert_eq!(stored.id, "c1"),
            _ => panic!("expected raced"),
        }
    }

    #[tokio::test]
    async fn add_consumer_detects_closed_producers() {
        let room = Room::new("r1".into());
        let (tx, _rx) = mpsc::channel(8);
        room.join(&"bob".into(), tx).await.unwrap();

        match room
            .add_consumer(&"bob".into(), consumer_for("never-existed", "c1"))
            .await
        {
            ConsumerAdded::ProducerGone => {}
            _ => panic!("expected producer gone"),
        }
    }

    #[tokio::test]
    async fn add_consumer_detects_vanished_subscribers() {
        let room = Room::new("r1".into());
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        room.join(&"ada".into(), tx_a).await.unwrap();
        room.join(&"bob".into(), tx_b).await.unwrap();
        room.add_producer(&"ada".into(), audio_seat("p1"))
            .await
            .unwrap();

        // Bob disconnects while his consume is with the engine. The
        // producer is still live, so the verdict is about his session.
        room.remove_user(&"bob".into()).await.unwrap();

        match room
            .add_consumer(&"bob".into(), consumer_for("p1", "c1"))
            .await
        {
            ConsumerAdded::SessionGone => {}
            _ => panic!("expected session gone"),
        }
    }
}
