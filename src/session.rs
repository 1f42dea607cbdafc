//! Live detection channels, one per lane.
//!
//! Each lane's channel follows `Closed → Connecting → Streaming → Closed`.
//! Channel workers never touch lane state: they push `ChannelEvent`s, tagged
//! with the lane and a per-lane generation, onto the coordinator's event
//! queue, and `LaneSessionManager::handle_event` applies them on the
//! coordinator's thread. Bumping the generation on every `open` is what keeps
//! a superseded channel from writing into its lane.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::coordinator::CoordinatorEvent;
use crate::error::{ChannelError, DecodeError};
use crate::lane::{Lane, LaneTable};
use crate::protocol::{self, DetectionEvent, ResourceToken};
use crate::state::LaneState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelPhase {
    #[default]
    Closed,
    Connecting,
    Streaming,
}

/// Something a channel worker observed.
#[derive(Debug)]
pub enum ChannelEvent {
    /// Transport is open; the handshake may be sent.
    Ready,
    Detection(DetectionEvent),
    /// Payload arrived but failed to decode. The channel stays open.
    Malformed(DecodeError),
    Error(ChannelError),
    /// Either side ended the channel, with the peer's reason if it gave one.
    Closed(Option<String>),
}

/// Worker-side reporting endpoint for one channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    lane: Lane,
    generation: u64,
    events: Sender<CoordinatorEvent>,
}

impl ChannelSink {
    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Each method returns `false` once the coordinator has been dropped,
    /// which tells the worker to stop.
    pub fn ready(&self) -> bool {
        self.send(ChannelEvent::Ready)
    }

    /// Decodes a text payload and forwards the result.
    pub fn deliver(&self, payload: &str) -> bool {
        match protocol::decode_detection(payload) {
            Ok(event) => self.send(ChannelEvent::Detection(event)),
            Err(e) => self.send(ChannelEvent::Malformed(e)),
        }
    }

    pub fn malformed(&self, err: DecodeError) -> bool {
        self.send(ChannelEvent::Malformed(err))
    }

    pub fn error(&self, err: ChannelError) -> bool {
        self.send(ChannelEvent::Error(err))
    }

    pub fn closed(&self, reason: Option<String>) -> bool {
        self.send(ChannelEvent::Closed(reason))
    }

    fn send(&self, event: ChannelEvent) -> bool {
        self.events
            .send(CoordinatorEvent::Channel {
                lane: self.lane,
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Exclusive ownership of one live channel.
///
/// Not `Clone`: the session table holding at most one handle per lane is
/// what makes "one channel per lane" hold. Dropping the handle closes the
/// channel and waits for its worker to exit.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: Sender<String>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// `outbound` feeds text frames to the worker, `stop` asks it to close.
    pub fn new(outbound: Sender<String>, stop: Arc<AtomicBool>, worker: Option<JoinHandle<()>>) -> Self {
        Self {
            outbound,
            stop,
            worker,
        }
    }

    pub fn send_text(&self, text: String) -> Result<(), ChannelError> {
        self.outbound
            .send(text)
            .map_err(|_| ChannelError::Disconnected)
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("channel worker panicked");
            }
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens live channels to the detection service.
///
/// `connect` must not block on the network: it starts the channel (usually
/// on a worker thread) and returns its handle. Progress is reported through
/// the sink, starting with `ready`.
pub trait StreamConnector: Send + Sync {
    fn connect(&self, sink: ChannelSink) -> Result<ChannelHandle, ChannelError>;
}

#[derive(Debug, Default)]
struct LaneSession {
    phase: ChannelPhase,
    generation: u64,
    token: Option<ResourceToken>,
    handle: Option<ChannelHandle>,
    malformed: u64,
}

impl LaneSession {
    fn teardown(&mut self) -> bool {
        self.phase = ChannelPhase::Closed;
        match self.handle.take() {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }
}

pub struct LaneSessionManager {
    connector: Box<dyn StreamConnector>,
    events: Sender<CoordinatorEvent>,
    sessions: LaneTable<LaneSession>,
}

impl LaneSessionManager {
    pub fn new(connector: Box<dyn StreamConnector>, events: Sender<CoordinatorEvent>) -> Self {
        Self {
            connector,
            events,
            sessions: LaneTable::from_fn(|_| LaneSession::default()),
        }
    }

    /// Opens a channel for `lane`, closing any channel the lane already has first.
    pub fn open(&mut self, lane: Lane, token: ResourceToken) {
        if self.close(lane) {
            log::info!("{}: replaced previous channel", lane);
        }

        let session = &mut self.sessions[lane];
        session.generation += 1;
        session.phase = ChannelPhase::Connecting;
        session.token = Some(token);
        let sink = ChannelSink {
            lane,
            generation: session.generation,
            events: self.events.clone(),
        };

        match self.connector.connect(sink) {
            Ok(handle) => {
                session.handle = Some(handle);
                log::info!("{}: channel connecting (generation {})", lane, session.generation);
            }
            Err(e) => {
                session.phase = ChannelPhase::Closed;
                log::error!("{}: failed to open channel: {}", lane, e);
            }
        }
    }

    /// Closes `lane`'s channel. Returns `false` when there was none.
    pub fn close(&mut self, lane: Lane) -> bool {
        let closed = self.sessions[lane].teardown();
        if closed {
            log::info!("{}: channel closed", lane);
        }
        closed
    }

    pub fn close_all(&mut self) {
        for lane in Lane::ALL {
            self.close(lane);
        }
    }

    /// Applies a worker event. Returns `true` when `state` changed.
    pub fn handle_event(
        &mut self,
        lane: Lane,
        generation: u64,
        event: ChannelEvent,
        state: &mut LaneState,
    ) -> bool {
        let session = &mut self.sessions[lane];
        if generation != session.generation {
            log::debug!(
                "{}: dropping event from superseded channel (generation {} != {})",
                lane,
                generation,
                session.generation
            );
            return false;
        }

        match event {
            ChannelEvent::Ready => {
                if session.phase != ChannelPhase::Connecting {
                    log::debug!("{}: ready signal in phase {:?} ignored", lane, session.phase);
                    return false;
                }
                let (Some(handle), Some(token)) = (&session.handle, &session.token) else {
                    session.teardown();
                    return false;
                };
                match handle.send_text(protocol::encode_handshake(token)) {
                    Ok(()) => {
                        session.phase = ChannelPhase::Streaming;
                        log::info!("{}: streaming detections for {}", lane, token);
                    }
                    Err(e) => {
                        log::error!("{}: handshake not sent: {}", lane, e);
                        session.teardown();
                    }
                }
                false
            }
            ChannelEvent::Detection(detection) => {
                if session.phase != ChannelPhase::Streaming {
                    log::debug!("{}: detection in phase {:?} ignored", lane, session.phase);
                    return false;
                }
                log::debug!(
                    "{}: {} classes, frame {} chars",
                    lane,
                    detection.counts.len(),
                    detection.frame.len()
                );
                state.apply(detection);
                true
            }
            ChannelEvent::Malformed(e) => {
                if session.phase == ChannelPhase::Streaming {
                    session.malformed += 1;
                    log::warn!("{}: {}", lane, e);
                }
                false
            }
            ChannelEvent::Error(e) => {
                if session.phase != ChannelPhase::Closed {
                    log::error!("{}: channel error: {}", lane, e);
                    session.teardown();
                }
                false
            }
            ChannelEvent::Closed(reason) => {
                if session.phase != ChannelPhase::Closed {
                    match reason {
                        Some(reason) => log::info!("{}: channel closed by peer: {}", lane, reason),
                        None => log::info!("{}: channel closed by peer", lane),
                    }
                    session.teardown();
                }
                false
            }
        }
    }

    pub fn phase(&self, lane: Lane) -> ChannelPhase {
        self.sessions[lane].phase
    }

    pub fn has_channel(&self, lane: Lane) -> bool {
        self.sessions[lane].handle.is_some()
    }

    /// Number of lanes currently holding a channel handle.
    pub fn live_channels(&self) -> usize {
        self.sessions.values().filter(|s| s.handle.is_some()).count()
    }

    pub fn generation(&self, lane: Lane) -> u64 {
        self.sessions[lane].generation
    }

    pub fn token(&self, lane: Lane) -> Option<&ResourceToken> {
        self.sessions[lane].token.as_ref()
    }

    /// Payloads on this lane that failed to decode.
    pub fn malformed_count(&self, lane: Lane) -> u64 {
        self.sessions[lane].malformed
    }
}
