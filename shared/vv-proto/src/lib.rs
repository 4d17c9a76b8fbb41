//! Visavis Protocol Library
//!
//! Wire types for the signaling protocol spoken between the Visavis server
//! and its clients: identifiers, media descriptors, and the command/event
//! enums carried over the WebSocket and REST surfaces.

pub mod media;
pub mod signal;

pub use media::*;
pub use signal::*;
