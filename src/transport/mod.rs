//! Network transports for the detection service.
//!
//! This module provides the HTTP multipart uploader used to hand videos to
//! the service and the WebSocket connector used for each lane's live
//! detection channel.

mod http;
mod ws;

pub use http::{HttpUploader, MultipartForm};
pub use ws::WsConnector;
