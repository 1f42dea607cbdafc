//! HTTP upload transport.
//!
//! Posts a `multipart/form-data` body with a single `file` field to the
//! service's upload endpoint and reads the resource token from the JSON
//! reply.

use std::io::Read;

use rand::RngCore;

use crate::error::UploadError;
use crate::lane::Lane;
use crate::protocol::{parse_upload_response, ResourceToken};
use crate::upload::{UploadTransport, VideoPayload};

const UPLOAD_FIELD: &str = "file";
const MAX_RESPONSE_BYTES: u64 = 64 * 1024;
const DEFAULT_VIDEO_TYPE: &str = "video/mp4";

/// Multipart body builder for file uploads.
#[derive(Debug)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        Self {
            boundary: format!("crossroad-{}", hex::encode(raw)),
            body: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn add_file(&mut self, field: &str, file_name: &str, content_type: &str, bytes: &[u8]) {
        let header = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
            boundary = self.boundary,
            field = field,
            file_name = quote_file_name(file_name),
            content_type = content_type,
        );
        self.body.extend_from_slice(header.as_bytes());
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
    }

    /// Returns the `Content-Type` header value and the finished body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn quote_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

/// Uploads lane videos over HTTP with `ureq`.
pub struct HttpUploader {
    agent: ureq::Agent,
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            url: url.into(),
        }
    }
}

impl UploadTransport for HttpUploader {
    fn upload(&self, lane: Lane, payload: &VideoPayload) -> Result<ResourceToken, UploadError> {
        let mut form = MultipartForm::new();
        form.add_file(
            UPLOAD_FIELD,
            payload.file_name(),
            payload.content_type().unwrap_or(DEFAULT_VIDEO_TYPE),
            payload.bytes(),
        );
        let (content_type, body) = form.finish();

        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(UploadError::Status { lane, status });
            }
            Err(ureq::Error::Transport(e)) => {
                return Err(UploadError::Transport {
                    lane,
                    message: e.to_string(),
                });
            }
        };

        let mut raw = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut raw)
            .map_err(|e| UploadError::Transport {
                lane,
                message: format!("read upload response: {}", e),
            })?;
        parse_upload_response(&raw).map_err(|message| UploadError::InvalidResponse { lane, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_wraps_file_bytes() {
        let mut form = MultipartForm::new();
        let boundary = form.boundary().to_string();
        form.add_file("file", "north.mp4", "video/mp4", b"\x00\x01video");
        let (content_type, body) = form.finish();

        assert_eq!(content_type, format!("multipart/form-data; boundary={}", boundary));
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with(&format!("--{}\r\n", boundary)));
        assert!(text.contains("name=\"file\"; filename=\"north.mp4\""));
        assert!(text.contains("Content-Type: video/mp4\r\n\r\n"));
        assert!(body.windows(7).any(|w| w == b"\x00\x01video"));
        assert!(text.ends_with(&format!("\r\n--{}--\r\n", boundary)));
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(MultipartForm::new().boundary(), MultipartForm::new().boundary());
    }

    #[test]
    fn file_name_cannot_break_header() {
        assert_eq!(quote_file_name("a\"b\r\n.mp4"), "a'b.mp4");
    }
}
