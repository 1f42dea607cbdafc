//! Lane upload dispatch.
//!
//! `UploadDispatcher::submit` flips the lane to `Loading` on the caller's
//! thread, then runs the request on a worker thread. The worker reports
//! exactly one `CoordinatorEvent::UploadSettled`, and the coordinator hands
//! it back to `settle`, which flips the lane to `Idle` again.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::coordinator::CoordinatorEvent;
use crate::error::UploadError;
use crate::lane::Lane;
use crate::protocol::ResourceToken;
use crate::state::{LaneState, UploadStatus};

/// A video file ready to be sent to the detection service.
#[derive(Clone, Debug)]
pub struct VideoPayload {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl VideoPayload {
    /// Creates a payload, inferring the MIME type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).map(str::to_string);
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Overrides the inferred MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.mp4".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check_video(&self) -> Result<(), String> {
        if self.bytes.is_empty() {
            return Err("file is empty".to_string());
        }
        match self.content_type.as_deref() {
            Some(ct) if ct.to_lowercase().starts_with("video/") => Ok(()),
            Some(ct) => Err(format!("content type '{}' is not video/*", ct)),
            None => Err(format!("cannot infer a video type for '{}'", self.file_name)),
        }
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    let ct = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpeg" | "mpg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(ct)
}

/// Sends one lane's video to the detection service.
///
/// Implementations block until the request settles; the dispatcher always
/// calls them from a worker thread.
pub trait UploadTransport: Send + Sync {
    fn upload(&self, lane: Lane, payload: &VideoPayload) -> Result<ResourceToken, UploadError>;
}

pub struct UploadDispatcher {
    transport: Arc<dyn UploadTransport>,
    events: Sender<CoordinatorEvent>,
}

impl UploadDispatcher {
    pub fn new(transport: Arc<dyn UploadTransport>, events: Sender<CoordinatorEvent>) -> Self {
        Self { transport, events }
    }

    /// Starts an upload for `lane`.
    ///
    /// On `Ok` the lane is `Loading` and exactly one `UploadSettled` event
    /// will follow. On `Err` the lane state is unchanged.
    pub fn submit(
        &self,
        lane: Lane,
        state: &mut LaneState,
        payload: VideoPayload,
    ) -> Result<(), UploadError> {
        if state.is_loading() {
            return Err(UploadError::InFlight { lane });
        }
        payload
            .check_video()
            .map_err(|reason| UploadError::NotVideo { lane, reason })?;

        state.upload_status = UploadStatus::Loading;
        log::info!(
            "{}: uploading {} ({} bytes)",
            lane,
            payload.file_name(),
            payload.bytes().len()
        );

        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name(format!("upload-{}", lane))
            .spawn(move || {
                let result = transport.upload(lane, &payload);
                // The coordinator may already be gone; nothing left to report to.
                let _ = events.send(CoordinatorEvent::UploadSettled { lane, result });
            });

        if let Err(e) = spawned {
            state.upload_status = UploadStatus::Idle;
            return Err(UploadError::Transport {
                lane,
                message: format!("spawn upload worker: {}", e),
            });
        }
        Ok(())
    }

    /// Applies a settled upload to the lane and returns the token on success.
    pub fn settle(
        &self,
        lane: Lane,
        state: &mut LaneState,
        result: Result<ResourceToken, UploadError>,
    ) -> Option<ResourceToken> {
        if !state.is_loading() {
            log::debug!("{}: upload settled while lane was not loading", lane);
        }
        state.upload_status = UploadStatus::Idle;
        match result {
            Ok(token) => {
                log::info!("{}: upload accepted, resource {}", lane, token);
                Some(token)
            }
            Err(e) => {
                log::warn!("Upload failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct FixedTransport;

    impl UploadTransport for FixedTransport {
        fn upload(&self, _lane: Lane, _payload: &VideoPayload) -> Result<ResourceToken, UploadError> {
            Ok(ResourceToken::new("v1"))
        }
    }

    fn dispatcher() -> (UploadDispatcher, mpsc::Receiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::channel();
        (UploadDispatcher::new(Arc::new(FixedTransport), tx), rx)
    }

    #[test]
    fn infers_video_content_type() {
        assert_eq!(
            VideoPayload::new("clip.MP4", vec![1]).content_type(),
            Some("video/mp4")
        );
        assert_eq!(VideoPayload::new("notes.txt", vec![1]).content_type(), None);
    }

    #[test]
    fn rejects_non_video_without_touching_state() {
        let (dispatcher, rx) = dispatcher();
        let mut state = LaneState::default();
        let err = dispatcher
            .submit(Lane::North, &mut state, VideoPayload::new("notes.txt", vec![1]))
            .unwrap_err();
        assert!(matches!(err, UploadError::NotVideo { lane: Lane::North, .. }));
        assert_eq!(state.upload_status, UploadStatus::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        let (dispatcher, _rx) = dispatcher();
        let mut state = LaneState::default();
        let result = dispatcher.submit(Lane::East, &mut state, VideoPayload::new("a.mp4", vec![]));
        assert!(matches!(result, Err(UploadError::NotVideo { .. })));
    }

    #[test]
    fn explicit_content_type_wins() {
        let (dispatcher, _rx) = dispatcher();
        let mut state = LaneState::default();
        let payload = VideoPayload::new("capture.bin", vec![0, 1]).with_content_type("video/mp4");
        assert!(dispatcher.submit(Lane::West, &mut state, payload).is_ok());
        assert!(state.is_loading());
    }

    #[test]
    fn submit_marks_loading_and_settle_resets() {
        let (dispatcher, rx) = dispatcher();
        let mut state = LaneState::default();
        dispatcher
            .submit(Lane::South, &mut state, VideoPayload::new("a.mp4", vec![1, 2, 3]))
            .expect("submit");
        assert_eq!(state.upload_status, UploadStatus::Loading);

        let second = dispatcher.submit(Lane::South, &mut state, VideoPayload::new("b.mp4", vec![1]));
        assert!(matches!(second, Err(UploadError::InFlight { lane: Lane::South })));

        let event = rx.recv().expect("settled");
        let CoordinatorEvent::UploadSettled { lane, result } = event else {
            panic!("unexpected event");
        };
        assert_eq!(lane, Lane::South);
        let token = dispatcher.settle(lane, &mut state, result);
        assert_eq!(token, Some(ResourceToken::new("v1")));
        assert_eq!(state.upload_status, UploadStatus::Idle);
    }
}
