//! Crossroad Monitor
//!
//! This crate coordinates up to four live vehicle-detection streams, one per
//! approach lane of a crossroad, against a remote detection service.
//!
//! # Architecture
//!
//! Per lane, a video is uploaded, the service answers with a resource token,
//! and a live channel is opened for that token. The channel streams detection
//! events (per-class vehicle counts plus an annotated frame) that replace the
//! lane's state wholesale. A crossroad-wide aggregate is recomputed from the
//! four lanes after every change.
//!
//! The coordinator enforces three rules by construction:
//!
//! 1. **One channel per lane**: channel handles live in a fixed four-slot
//!    table and are not `Clone`; opening a lane closes its old channel first.
//! 2. **Last write wins**: a lane shows only the newest event, never a merge.
//! 3. **No orphaned channels**: dropping the coordinator closes and joins
//!    every channel worker.
//!
//! # Module Structure
//!
//! - `lane`: lane keys and `LaneTable`
//! - `state`: per-lane `LaneState`
//! - `protocol`: wire formats and strict decoding
//! - `upload`: `UploadDispatcher`
//! - `session`: `LaneSessionManager` and the channel state machine
//! - `aggregate`: `StateAggregator`
//! - `coordinator`: `Coordinator`, the lifecycle owner
//! - `transport`: HTTP upload and WebSocket channel implementations
//! - `dashboard`: read-only board rendering for the CLI

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod lane;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod upload;

pub use aggregate::{active_lane_count, totals, Aggregate, StateAggregator};
pub use config::{ChannelSettings, MonitorConfig};
pub use coordinator::{Coordinator, CoordinatorEvent};
pub use error::{ChannelError, DecodeError, UploadError};
pub use lane::{Lane, LaneTable, UnknownLane};
pub use protocol::{DetectionEvent, ResourceToken, KNOWN_VEHICLE_CLASSES};
pub use session::{
    ChannelEvent, ChannelHandle, ChannelPhase, ChannelSink, LaneSessionManager, StreamConnector,
};
pub use state::{Counts, Frame, LaneState, UploadStatus};
pub use upload::{UploadDispatcher, UploadTransport, VideoPayload};
