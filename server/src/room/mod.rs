//! Rooms and Sessions
//!
//! In-memory membership state for meeting rooms: the registry of live
//! rooms, each room's sessions, and the per-session transport, producer
//! and consumer seats. All engine handles are stored here; the signaling
//! handlers decide what to do with them.

mod registry;
mod room;
mod session;

pub use registry::RoomRegistry;
pub use room::{fan_out, ConsumerAdded, Recipients, RemovedSession, Room};
pub use session::{ProducerSeat, Session, TransportSeat};
