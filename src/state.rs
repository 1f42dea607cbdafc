//! Per-lane state read by the rendering layer.

use std::collections::BTreeMap;

use base64::Engine;

use crate::protocol::DetectionEvent;

/// Vehicle class name → most recently reported quantity.
///
/// `u32` keeps every count non-negative; a class that is absent counts as zero.
pub type Counts = BTreeMap<String, u32>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UploadStatus {
    #[default]
    Idle,
    Loading,
}

/// Latest annotated frame for a lane, kept as the base64 text the service sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the encoded payload.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JPEG bytes behind the payload, or `None` if it is not standard base64.
    pub fn decode(&self) -> Option<Vec<u8>> {
        base64::engine::general_purpose::STANDARD.decode(&self.0).ok()
    }
}

/// Everything the monitor knows about one lane.
///
/// Channel ownership is kept by the session manager; this struct only holds
/// what the dashboard renders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneState {
    pub upload_status: UploadStatus,
    pub frame: Frame,
    pub counts: Counts,
}

impl LaneState {
    pub fn is_loading(&self) -> bool {
        self.upload_status == UploadStatus::Loading
    }

    /// A lane is active once it has shown at least one non-empty frame.
    pub fn is_active(&self) -> bool {
        !self.frame.is_empty()
    }

    /// Replaces counts and frame wholesale with the event's contents.
    pub(crate) fn apply(&mut self, event: DetectionEvent) {
        self.counts = event.counts;
        self.frame = event.frame;
    }
}
