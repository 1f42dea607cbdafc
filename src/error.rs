//! Error taxonomy for the coordinator.
//!
//! None of these errors is fatal. Each is logged and reflected only through
//! the affected lane's status; the other lanes carry on.

use thiserror::Error;

use crate::lane::Lane;

/// Failure of a single lane upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{lane}: payload is not a video ({reason})")]
    NotVideo { lane: Lane, reason: String },

    #[error("{lane}: an upload is already in flight")]
    InFlight { lane: Lane },

    #[error("{lane}: upload transport failed: {message}")]
    Transport { lane: Lane, message: String },

    #[error("{lane}: upload rejected with HTTP {status}")]
    Status { lane: Lane, status: u16 },

    #[error("{lane}: invalid upload response: {message}")]
    InvalidResponse { lane: Lane, message: String },
}

impl UploadError {
    pub fn lane(&self) -> Lane {
        match self {
            Self::NotVideo { lane, .. }
            | Self::InFlight { lane }
            | Self::Transport { lane, .. }
            | Self::Status { lane, .. }
            | Self::InvalidResponse { lane, .. } => *lane,
        }
    }
}

/// Transport-level failure of a lane's live channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid stream endpoint: {0}")]
    Endpoint(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("channel transport error: {0}")]
    Transport(String),

    #[error("channel worker is gone")]
    Disconnected,
}

/// A stream payload that could not be turned into a detection event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed detection payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary stream messages are not supported ({0} bytes)")]
    Binary(usize),
}
