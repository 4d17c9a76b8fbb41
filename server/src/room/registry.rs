//! Room Registry
//!
//! Lazily creates rooms and disposes them a linger window after they empty,
//! so a refresh or flaky connection can rejoin without losing the room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;
use vv_proto::RoomId;

use super::room::Room;

/// All live rooms.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, Arc<Room>>>>,
    linger: Duration,
}

impl RoomRegistry {
    /// Create a registry whose empty rooms survive for `linger`.
    #[must_use]
    pub fn new(linger: Duration) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            linger,
        }
    }

    /// Get a room, creating it on first reference.
    pub async fn get_or_create(&self, room_id: &RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;

        if let Some(room) = rooms.get(room_id) {
            return Arc::clone(room);
        }

        let room = Arc::new(Room::new(room_id.clone()));
        rooms.insert(room_id.clone(), Arc::clone(&room));
        debug!(room_id = %room_id, "Created room");
        room
    }

    /// Get a room if it exists.
    pub async fn find(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Dispose `room_id` after the linger window unless a session registered
    /// in the meantime (the captured epoch moved) or the room refilled.
    pub fn schedule_disposal(&self, room_id: RoomId, epoch: u64) {
        let rooms = Arc::clone(&self.rooms);
        let linger = self.linger;
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            let mut rooms = rooms.write().await;
            if let Some(room) = rooms.get(&room_id) {
                if room.is_empty().await && room.epoch().await == epoch {
                    rooms.remove(&room_id);
                    debug!(room_id = %room_id, "Disposed room after linger window");
                }
            }
        });
    }
}
