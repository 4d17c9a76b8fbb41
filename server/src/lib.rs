//! Visavis Server
//!
//! Signaling and session orchestration backend for SFU-based multi-party
//! video meetings. Negotiates transports, producers and consumers between
//! meeting clients and a media engine, and keeps every member's view of the
//! room consistent.

pub mod api;
pub mod config;
pub mod engine;
pub mod room;
pub mod signaling;
