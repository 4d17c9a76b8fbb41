//! Negotiation Protocol Handlers
//!
//! The operation set shared by both carriers: the WebSocket channel and the
//! REST fallback. Engine calls run outside the room lock; each post-call
//! insertion revalidates what may have changed while the call was in
//! flight, so a torn negotiation never leaves visible state behind.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use vv_proto::{
    ConsumerDescriptor, DtlsParameters, MediaKind, ProducerId, ProducerInfo, RoomId,
    RtpCapabilities, RtpParameters, ServerEvent, TransportDescriptor, TransportDirection,
    TransportId, UserId,
};

use super::error::SignalError;
use crate::engine::MediaEngine;
use crate::room::{fan_out, ConsumerAdded, ProducerSeat, RoomRegistry, TransportSeat};

/// Identifier charset, shared with the REST carrier's request validation.
pub(super) static ID_REGEX: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

fn ensure_id(what: &str, value: &str) -> Result<(), SignalError> {
    if ID_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(SignalError::Validation(format!(
            "{what} must be 1-64 characters of [A-Za-z0-9_-]"
        )))
    }
}

/// Router capabilities for device loading.
pub async fn get_capabilities(
    engine: &Arc<dyn MediaEngine>,
) -> Result<RtpCapabilities, SignalError> {
    Ok(engine.router_capabilities().await?)
}

/// Register a joined session and snapshot every other member's producers in
/// the same critical section, so each producer reaches the joiner exactly
/// once: either here or as a later push.
pub async fn join_room(
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
    events: mpsc::Sender<ServerEvent>,
) -> Result<Vec<ProducerInfo>, SignalError> {
    ensure_id("roomId", room_id)?;
    ensure_id("userId", user_id)?;

    let room = rooms.get_or_create(room_id).await;
    let producers = room.join(user_id, events).await?;

    let participants = room.session_count().await;
    info!(
        user_id = %user_id,
        room_id = %room_id,
        participants,
        existing_producers = producers.len(),
        "User joined room"
    );

    Ok(producers)
}

/// Allocate a transport with the engine and seat it in the room, creating
/// the session on first contact.
pub async fn create_transport(
    engine: &Arc<dyn MediaEngine>,
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
    direction: TransportDirection,
) -> Result<TransportDescriptor, SignalError> {
    ensure_id("roomId", room_id)?;
    ensure_id("userId", user_id)?;

    let room = rooms.get_or_create(room_id).await;
    let descriptor = engine.create_transport().await?;
    room.register_transport(
        user_id,
        TransportSeat {
            id: descriptor.id.clone(),
            direction,
        },
    )
    .await;

    debug!(
        user_id = %user_id,
        room_id = %room_id,
        transport_id = %descriptor.id,
        direction = %direction,
        "Transport created"
    );

    Ok(descriptor)
}

/// Relay the client's DTLS parameters to the engine.
pub async fn connect_transport(
    engine: &Arc<dyn MediaEngine>,
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    transport_id: &TransportId,
    dtls_parameters: &DtlsParameters,
) -> Result<(), SignalError> {
    let room = rooms
        .find(room_id)
        .await
        .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
    room.find_transport(transport_id)
        .await
        .ok_or_else(|| SignalError::TransportNotFound(transport_id.clone()))?;

    engine.connect_transport(transport_id, dtls_parameters).await?;

    debug!(room_id = %room_id, transport_id = %transport_id, "Transport connected");
    Ok(())
}

/// Publish a track and announce it to every other connected member.
///
/// The insertion and the recipient capture happen in one critical section;
/// the announcement itself is sent after the lock drops.
pub async fn produce(
    engine: &Arc<dyn MediaEngine>,
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
    transport_id: &TransportId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
) -> Result<(ProducerId, MediaKind), SignalError> {
    let room = rooms
        .find(room_id)
        .await
        .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
    let (owner, _) = room
        .find_transport(transport_id)
        .await
        .ok_or_else(|| SignalError::TransportNotFound(transport_id.clone()))?;
    if owner != *user_id {
        return Err(SignalError::TransportNotFound(transport_id.clone()));
    }

    let handle = engine.produce(transport_id, kind, rtp_parameters).await?;

    let Some(recipients) = room
        .add_producer(
            user_id,
            ProducerSeat {
                id: handle.id.clone(),
                kind: handle.kind,
            },
        )
        .await
    else {
        // The session vanished while the engine call was in flight; nothing
        // partial may stay visible.
        engine.close_producer(&handle.id).await;
        return Err(SignalError::TransportNotFound(transport_id.clone()));
    };

    fan_out(
        &recipients,
        &ServerEvent::NewProducer {
            room_id: room_id.clone(),
            producer_id: handle.id.clone(),
            user_id: user_id.clone(),
            kind: handle.kind,
        },
    )
    .await;

    info!(
        user_id = %user_id,
        room_id = %room_id,
        producer_id = %handle.id,
        kind = %handle.kind,
        "Producer published"
    );

    Ok((handle.id, handle.kind))
}

/// Subscribe to a producer. Repeats for the same (user, producer) pair
/// return the stored descriptor instead of creating a second consumer.
pub async fn consume(
    engine: &Arc<dyn MediaEngine>,
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
    transport_id: &TransportId,
    producer_id: &ProducerId,
    rtp_capabilities: RtpCapabilities,
) -> Result<ConsumerDescriptor, SignalError> {
    let room = rooms
        .find(room_id)
        .await
        .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
    let (owner, _) = room
        .find_transport(transport_id)
        .await
        .ok_or_else(|| SignalError::TransportNotFound(transport_id.clone()))?;
    if owner != *user_id {
        return Err(SignalError::TransportNotFound(transport_id.clone()));
    }
    room.lookup_producer(producer_id)
        .await
        .ok_or_else(|| SignalError::ProducerNotFound(producer_id.clone()))?;

    if let Some(stored) = room.stored_consumer(user_id, producer_id).await {
        debug!(
            user_id = %user_id,
            producer_id = %producer_id,
            consumer_id = %stored.id,
            "Repeat subscription, returning stored consumer"
        );
        return Ok(stored);
    }

    if !engine.can_consume(producer_id, &rtp_capabilities).await? {
        return Err(SignalError::CannotConsume(producer_id.clone()));
    }

    let descriptor = engine
        .consume(transport_id, producer_id, rtp_capabilities)
        .await?;

    match room.add_consumer(user_id, descriptor.clone()).await {
        ConsumerAdded::Inserted => {
            debug!(
                user_id = %user_id,
                room_id = %room_id,
                producer_id = %producer_id,
                consumer_id = %descriptor.id,
                "Consumer created"
            );
            Ok(descriptor)
        }
        ConsumerAdded::Raced(stored) => {
            engine.close_consumer(&descriptor.id).await;
            Ok(stored)
        }
        ConsumerAdded::SessionGone => {
            engine.close_consumer(&descriptor.id).await;
            Err(SignalError::TransportNotFound(transport_id.clone()))
        }
        ConsumerAdded::ProducerGone => {
            engine.close_consumer(&descriptor.id).await;
            Err(SignalError::ProducerNotFound(producer_id.clone()))
        }
    }
}

/// Producers visible to `user_id`, for the polling fallback.
pub async fn list_producers(
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<Vec<ProducerInfo>, SignalError> {
    let room = rooms
        .find(room_id)
        .await
        .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
    Ok(room.snapshot_except(user_id).await)
}

/// Tear down a session: release every engine handle it held, tell the rest
/// of the room which producers died, and schedule room disposal when the
/// last session is gone.
///
/// Leaving a user or room that does not exist is a silent no-op, so the
/// disconnect path can always call this.
pub async fn leave(
    engine: &Arc<dyn MediaEngine>,
    rooms: &Arc<RoomRegistry>,
    room_id: &RoomId,
    user_id: &UserId,
) {
    let Some(room) = rooms.find(room_id).await else {
        return;
    };
    let Some(removed) = room.remove_user(user_id).await else {
        return;
    };

    for consumer_id in removed.consumers.iter().chain(&removed.swept_consumers) {
        engine.close_consumer(consumer_id).await;
    }
    for seat in &removed.producers {
        engine.close_producer(&seat.id).await;
    }
    for transport_id in &removed.transports {
        engine.close_transport(transport_id).await;
    }

    for seat in &removed.producers {
        fan_out(
            &removed.recipients,
            &ServerEvent::ProducerClosed {
                room_id: room_id.clone(),
                producer_id: seat.id.clone(),
            },
        )
        .await;
    }

    if removed.now_empty {
        rooms.schedule_disposal(room_id.clone(), removed.epoch);
    }

    info!(
        user_id = %user_id,
        room_id = %room_id,
        producers_closed = removed.producers.len(),
        "User left room"
    );
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod handler_test;
