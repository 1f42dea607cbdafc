//! The four-lane coordinator.
//!
//! `Coordinator` owns the lane table, the upload dispatcher, the session
//! manager and the aggregate as one unit. Upload and channel workers run on
//! their own threads but only ever talk to it through `CoordinatorEvent`s;
//! every state change happens on the thread that calls `process_pending` or
//! `wait_event`.
//!
//! Dropping the coordinator (or calling `shutdown`) closes every live
//! channel and joins its worker before returning.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{Aggregate, StateAggregator};
use crate::config::MonitorConfig;
use crate::error::{ChannelError, UploadError};
use crate::lane::{Lane, LaneTable};
use crate::protocol::ResourceToken;
use crate::session::{ChannelEvent, ChannelPhase, LaneSessionManager, StreamConnector};
use crate::state::LaneState;
use crate::transport::{HttpUploader, WsConnector};
use crate::upload::{UploadDispatcher, UploadTransport, VideoPayload};

/// Completion reported by an upload or channel worker.
#[derive(Debug)]
pub enum CoordinatorEvent {
    UploadSettled {
        lane: Lane,
        result: Result<ResourceToken, UploadError>,
    },
    Channel {
        lane: Lane,
        generation: u64,
        event: ChannelEvent,
    },
}

pub struct Coordinator {
    lanes: LaneTable<LaneState>,
    uploads: UploadDispatcher,
    sessions: LaneSessionManager,
    aggregator: StateAggregator,
    events: Receiver<CoordinatorEvent>,
}

impl Coordinator {
    pub fn new(uploader: Arc<dyn UploadTransport>, connector: Box<dyn StreamConnector>) -> Self {
        let (tx, rx): (Sender<CoordinatorEvent>, _) = mpsc::channel();
        Self {
            lanes: LaneTable::default(),
            uploads: UploadDispatcher::new(uploader, tx.clone()),
            sessions: LaneSessionManager::new(connector, tx),
            aggregator: StateAggregator::new(),
            events: rx,
        }
    }

    /// Builds a coordinator talking HTTP + WebSocket to the configured service.
    pub fn connect(config: &MonitorConfig) -> Result<Self, ChannelError> {
        let uploader = HttpUploader::new(config.upload_url.clone());
        let connector = WsConnector::new(&config.stream_url, config.channel.clone())?;
        Ok(Self::new(Arc::new(uploader), Box::new(connector)))
    }

    /// Starts uploading `payload` for `lane`. The lane is `Loading` on return.
    pub fn submit(&mut self, lane: Lane, payload: VideoPayload) -> Result<(), UploadError> {
        self.uploads.submit(lane, &mut self.lanes[lane], payload)
    }

    /// Closes `lane`'s channel, keeping its last counts and frame.
    pub fn close_lane(&mut self, lane: Lane) -> bool {
        self.sessions.close(lane)
    }

    /// Applies every queued event without blocking. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Waits up to `timeout` for the next event, then drains the queue.
    pub fn wait_event(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event);
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn apply(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::UploadSettled { lane, result } => {
                if let Some(token) = self.uploads.settle(lane, &mut self.lanes[lane], result) {
                    self.sessions.open(lane, token);
                }
            }
            CoordinatorEvent::Channel {
                lane,
                generation,
                event,
            } => {
                if !self
                    .sessions
                    .handle_event(lane, generation, event, &mut self.lanes[lane])
                {
                    return;
                }
            }
        }
        self.aggregator.recompute(&self.lanes);
    }

    pub fn lane(&self, lane: Lane) -> &LaneState {
        &self.lanes[lane]
    }

    pub fn lanes(&self) -> &LaneTable<LaneState> {
        &self.lanes
    }

    pub fn aggregate(&self) -> &Aggregate {
        self.aggregator.current()
    }

    pub fn phase(&self, lane: Lane) -> ChannelPhase {
        self.sessions.phase(lane)
    }

    pub fn phases(&self) -> LaneTable<ChannelPhase> {
        LaneTable::from_fn(|lane| self.sessions.phase(lane))
    }

    pub fn sessions(&self) -> &LaneSessionManager {
        &self.sessions
    }

    pub fn live_channels(&self) -> usize {
        self.sessions.live_channels()
    }

    /// No upload in flight and no channel open.
    pub fn is_idle(&self) -> bool {
        self.live_channels() == 0 && self.lanes.values().all(|state| !state.is_loading())
    }

    /// Closes every channel and waits for the channel workers to exit.
    pub fn shutdown(mut self) {
        self.close_all_channels();
    }

    fn close_all_channels(&mut self) {
        let live = self.sessions.live_channels();
        if live > 0 {
            log::info!("closing {} live channel(s)", live);
        }
        self.sessions.close_all();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.close_all_channels();
    }
}
