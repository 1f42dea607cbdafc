//! WebSocket channel transport.
//!
//! Every channel gets one worker thread that owns the socket. The socket
//! runs with a short read timeout so the worker can interleave three jobs:
//! forwarding inbound text frames to the sink, writing queued outbound
//! frames (the handshake), and noticing the stop flag raised by
//! `ChannelHandle::close`.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::config::ChannelSettings;
use crate::error::{ChannelError, DecodeError};
use crate::session::{ChannelHandle, ChannelSink, StreamConnector};

const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Opens lane channels against a `ws://` streaming endpoint.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: Url,
    settings: ChannelSettings,
}

impl WsConnector {
    pub fn new(url: &str, settings: ChannelSettings) -> Result<Self, ChannelError> {
        let url = Url::parse(url).map_err(|e| ChannelError::Endpoint(format!("{}: {}", url, e)))?;
        if url.scheme() != "ws" {
            return Err(ChannelError::Endpoint(format!(
                "unsupported scheme '{}'; expected ws",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ChannelError::Endpoint(format!("{} has no host", url)));
        }
        Ok(Self { url, settings })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl StreamConnector for WsConnector {
    fn connect(&self, sink: ChannelSink) -> Result<ChannelHandle, ChannelError> {
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let lane = sink.lane();
        let worker = ChannelWorker {
            url: self.url.clone(),
            settings: self.settings.clone(),
            sink,
            outbound: outbound_rx,
            stop: stop.clone(),
        };
        let join = thread::Builder::new()
            .name(format!("channel-{}", lane))
            .spawn(move || worker.run())
            .map_err(|e| ChannelError::Connect(format!("spawn channel worker: {}", e)))?;
        Ok(ChannelHandle::new(outbound_tx, stop, Some(join)))
    }
}

enum Exit {
    Stopped,
    PeerClosed(Option<String>),
}

struct ChannelWorker {
    url: Url,
    settings: ChannelSettings,
    sink: ChannelSink,
    outbound: Receiver<String>,
    stop: Arc<AtomicBool>,
}

impl ChannelWorker {
    fn run(self) {
        let mut socket = match self.establish() {
            Ok(Some(socket)) => socket,
            Ok(None) => return,
            Err(e) => {
                self.sink.error(e);
                return;
            }
        };

        if !self.sink.ready() {
            self.close_gracefully(&mut socket);
            return;
        }

        match self.pump(&mut socket) {
            Ok(Exit::Stopped) => self.close_gracefully(&mut socket),
            Ok(Exit::PeerClosed(reason)) => {
                self.sink.closed(reason);
            }
            Err(e) => {
                self.sink.error(e);
            }
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Connects TCP and completes the WebSocket upgrade.
    /// Returns `Ok(None)` when the channel was closed before that finished.
    fn establish(&self) -> Result<Option<WebSocket<TcpStream>>, ChannelError> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| ChannelError::Endpoint(format!("{} has no host", self.url)))?;
        let port = self.url.port_or_known_default().unwrap_or(80);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| ChannelError::Connect(format!("resolve {}:{}: {}", host, port, e)))?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            if self.stopping() {
                return Ok(None);
            }
            match TcpStream::connect_timeout(&addr, self.settings.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(format!("{}: {}", addr, e)),
            }
        }
        let stream = stream.ok_or_else(|| {
            ChannelError::Connect(last_error.unwrap_or_else(|| format!("no address for {}", host)))
        })?;
        stream
            .set_nodelay(true)
            .and_then(|_| stream.set_read_timeout(Some(self.settings.poll_interval)))
            .map_err(|e| ChannelError::Connect(format!("configure socket: {}", e)))?;

        let mut attempt = tungstenite::client::client(self.url.as_str(), stream);
        loop {
            match attempt {
                Ok((socket, _response)) => return Ok(Some(socket)),
                Err(HandshakeError::Interrupted(mid)) => {
                    if self.stopping() {
                        return Ok(None);
                    }
                    attempt = mid.handshake();
                }
                Err(HandshakeError::Failure(e)) => {
                    return Err(ChannelError::Handshake(e.to_string()));
                }
            }
        }
    }

    fn pump(&self, socket: &mut WebSocket<TcpStream>) -> Result<Exit, ChannelError> {
        loop {
            if self.stopping() {
                return Ok(Exit::Stopped);
            }

            while let Ok(text) = self.outbound.try_recv() {
                socket
                    .send(Message::Text(text.into()))
                    .map_err(|e| ChannelError::Transport(e.to_string()))?;
            }

            match socket.read() {
                Ok(Message::Text(text)) => {
                    if !self.sink.deliver(&text) {
                        return Ok(Exit::Stopped);
                    }
                }
                Ok(Message::Binary(bytes)) => {
                    if !self.sink.malformed(DecodeError::Binary(bytes.len())) {
                        return Ok(Exit::Stopped);
                    }
                }
                Ok(Message::Close(frame)) => {
                    // Flush the close reply tungstenite queued for us.
                    let _ = socket.flush();
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty());
                    return Ok(Exit::PeerClosed(reason));
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if is_poll_timeout(e.kind()) => {}
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return Ok(Exit::PeerClosed(None)),
                Err(e) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }

    fn close_gracefully(&self, socket: &mut WebSocket<TcpStream>) {
        if socket.close(None).is_err() {
            return;
        }
        let deadline = Instant::now() + CLOSE_GRACE;
        while Instant::now() < deadline {
            match socket.read() {
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if is_poll_timeout(e.kind()) => {
                    let _ = socket.flush();
                }
                Err(_) => break,
            }
        }
        log::debug!(
            "{}: channel worker finished (generation {})",
            self.sink.lane(),
            self.sink.generation()
        );
    }
}

fn is_poll_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            poll_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn accepts_ws_endpoint() {
        let connector = WsConnector::new("ws://localhost:8000/ws/process", settings()).unwrap();
        assert_eq!(connector.url().path(), "/ws/process");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            WsConnector::new("http://localhost:8000/ws/process", settings()),
            Err(ChannelError::Endpoint(_))
        ));
        assert!(matches!(
            WsConnector::new("not a url", settings()),
            Err(ChannelError::Endpoint(_))
        ));
    }

    #[test]
    fn poll_timeouts_are_recognised() {
        assert!(is_poll_timeout(ErrorKind::WouldBlock));
        assert!(is_poll_timeout(ErrorKind::TimedOut));
        assert!(!is_poll_timeout(ErrorKind::ConnectionReset));
    }
}
