//! Error types for hwlink-core

use thiserror::Error;

use crate::types::SessionId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery stream error: {0}")]
    Discovery(String),

    #[error("Failed to connect to device: {0}")]
    Connect(String),

    #[error("Failed to disconnect session: {0}")]
    Disconnect(String),

    #[error("No active session for id: {0}")]
    SessionNotFound(SessionId),
}

pub type Result<T> = std::result::Result<T, Error>;
