//! Common types used throughout hwlink-core

use serde::{Deserialize, Serialize};

/// Number of session id characters shown in display form
const SESSION_DISPLAY_LEN: usize = 12;

/// A device candidate reported by a discovery stream.
///
/// Only valid for the discovery cycle that produced it. All fields are
/// opaque to the orchestration core; they come from, and go back to, the
/// transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Transport-defined identifier
    pub id: String,
    /// Human-readable label
    pub name: String,
    /// Model identifier reported at discovery time
    pub model_id: String,
}

impl DiscoveredDevice {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model_id: model_id.into(),
        }
    }
}

/// Opaque token identifying an active device session.
///
/// The token is never interpreted; it is only stored, compared and passed
/// back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated display form: the first 12 characters followed by `...`
    pub fn short(&self) -> String {
        let cut = self
            .0
            .char_indices()
            .nth(SESSION_DISPLAY_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        format!("{}...", &self.0[..cut])
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Post-connect device metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model_id: String,
}

impl DeviceInfo {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    /// Display form of the model name (lower-cased)
    pub fn display_model(&self) -> String {
        self.model_id.to_lowercase()
    }
}

/// Discovery/pairing lifecycle state.
///
/// Exactly one state is active at a time. It is owned by the
/// [`DeviceLink`](crate::DeviceLink) and observable only through the
/// [`StatusSink`](crate::StatusSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Idle,
    Searching,
    Found,
    Connected,
    Disconnected,
    TimedOut,
    Error,
}

impl DiscoveryState {
    /// Human-readable status line for this state
    pub fn message(&self) -> &'static str {
        match self {
            DiscoveryState::Idle => "awaiting_connection...",
            DiscoveryState::Searching => "scanning_devices...",
            DiscoveryState::Found => "device_detected // establishing_link...",
            DiscoveryState::Connected => "connection_established // access_granted",
            DiscoveryState::Disconnected => "session_terminated // ready",
            DiscoveryState::TimedOut => "scan_timeout // no_device_found",
            DiscoveryState::Error => "error // connection_failed",
        }
    }
}
