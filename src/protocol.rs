//! Wire formats spoken with the detection service.
//!
//! Upload response: `{"path": "<token>"}`.
//! Stream handshake (client → service, once): `{"path": "<token>"}`.
//! Stream message (service → client, repeated):
//! `{"counts": {"car": 3, ...}, "frame": "<base64 jpeg>"}`.
//!
//! Decoding is strict: a payload either becomes a fully typed
//! `DetectionEvent` or a `DecodeError`, never a partially applied update.

use std::fmt;

use serde::Deserialize;

use crate::error::DecodeError;
use crate::state::{Counts, Frame};

/// Classes the detection service reports on, in dashboard order.
pub const KNOWN_VEHICLE_CLASSES: [&str; 6] =
    ["car", "person", "truck", "bus", "motorbike", "ambulance"];

/// Opaque handle naming an uploaded resource on the detection service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceToken(String);

impl ResourceToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    path: String,
}

#[derive(Debug, Deserialize)]
struct DetectionMessage {
    counts: Counts,
    frame: String,
}

/// One decoded detection update for a lane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionEvent {
    pub counts: Counts,
    pub frame: Frame,
}

/// Extracts the resource token from an upload response body.
pub fn parse_upload_response(body: &[u8]) -> Result<ResourceToken, String> {
    let response: UploadResponse =
        serde_json::from_slice(body).map_err(|e| format!("parse error: {}", e))?;
    if response.path.trim().is_empty() {
        return Err("empty resource path".to_string());
    }
    Ok(ResourceToken(response.path))
}

/// Builds the single handshake message sent once a channel is ready.
pub fn encode_handshake(token: &ResourceToken) -> String {
    serde_json::json!({ "path": token.as_str() }).to_string()
}

/// Decodes one text stream message.
///
/// Counts must be non-negative integers. The frame text is kept exactly as
/// sent; it is only decoded where its bytes are needed.
pub fn decode_detection(payload: &str) -> Result<DetectionEvent, DecodeError> {
    let message: DetectionMessage = serde_json::from_str(payload)?;
    Ok(DetectionEvent {
        counts: message.counts,
        frame: Frame::new(message.frame),
    })
}
