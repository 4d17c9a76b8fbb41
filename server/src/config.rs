//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::Result;
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Base URL of the media worker (e.g., "http://127.0.0.1:4443").
    /// When unset the server runs on the in-process stub engine.
    pub media_engine_url: Option<String>,

    /// Per-request timeout for media worker calls in seconds (default: 10)
    pub engine_timeout_secs: u64,

    /// How long an empty room lingers before disposal, in seconds
    /// (default: 30)
    pub room_linger_secs: u64,

    /// Capacity of each connection's outbound event channel (default: 100)
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("VV_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            media_engine_url: env::var("VV_MEDIA_ENGINE_URL").ok(),
            engine_timeout_secs: env::var("VV_ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            room_linger_secs: env::var("VV_ROOM_LINGER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            event_buffer: env::var("VV_EVENT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        })
    }

    /// Check if a media worker is configured.
    #[must_use]
    pub const fn has_media_engine(&self) -> bool {
        self.media_engine_url.is_some()
    }

    /// Create a default configuration for testing.
    ///
    /// Runs on the stub engine; no external services required.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            media_engine_url: None,
            engine_timeout_secs: 10,
            room_linger_secs: 30,
            event_buffer: 100,
        }
    }
}
