//! Visavis Client
//!
//! Meeting agent library: mirrors the signaling protocol against a Visavis
//! server, keeps the set of consumed peer tracks consistent, and drives a
//! pluggable local media stack through the [`media::MediaBridge`] trait.
//! Headless by itself; real capture and playout live behind the bridge.

pub mod error;
pub mod media;
pub mod session;
pub mod socket;

pub use error::ClientError;
pub use media::{HeadlessBridge, LocalTrack, MediaBridge, MediaBridgeError};
pub use session::{AgentEvent, RoomSession, SessionConfig};
