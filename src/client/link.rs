//! A single outbound TCP connection to a chat peer.
//!
//! `PeerLink` owns the socket and its lifecycle state. Writes never happen on the
//! caller's thread: `send` queues a frame for the link's writer thread and returns.
//! Everything that is only known later (write completion, write failure, inbound
//! lines, state changes) is reported through a [`LinkEvent`] channel that the
//! interactive loop drains.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::common::{ConnectionState, PeerEndpoint};
use crate::error::{ConnectError, SendError};
use crate::protocol::{self, FrameReader};

/// Dial and socket behaviour of a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOptions {
    /// `None` dials without a deadline
    pub connect_timeout: Option<Duration>,
    /// `None` lets a write block until the peer drains it. Frames sent in the
    /// meantime wait in an unbounded queue, so a stalled peer grows it without
    /// limit unless a timeout turns the stall into a write failure.
    pub write_timeout: Option<Duration>,
    /// Run a reader thread that reports inbound lines
    pub receive: bool,
}

/// Something that happened on a link outside of a direct call
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub endpoint: PeerEndpoint,
    /// Connection attempt the event belongs to, see [`PeerLink::generation`]
    pub generation: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    StateChanged(ConnectionState),
    /// A queued frame reached the socket
    Written { bytes: usize },
    /// A line arrived from the peer
    Inbound(String),
    /// A queued frame could not be written
    WriteFailed(SendError),
}

pub type LinkEvents = Receiver<LinkEvent>;

/// Creates the channel links report into
pub fn event_channel() -> (Sender<LinkEvent>, LinkEvents) {
    mpsc::channel()
}

/// Connection attempts are numbered process-wide, so events of two links to the
/// same peer never share a generation.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

struct Shared {
    state: ConnectionState,
    stream: Option<Arc<TcpStream>>,
    writer: Option<Sender<Vec<u8>>>,
    /// Bumped on every connection attempt so workers of an old socket can't touch a new one
    generation: u64,
}

/// The part of a link that background workers hold on to
#[derive(Clone)]
struct LinkCore {
    endpoint: PeerEndpoint,
    shared: Arc<Mutex<Shared>>,
    events: Sender<LinkEvent>,
}

impl LinkCore {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, generation: u64, kind: LinkEventKind) {
        let event = LinkEvent {
            endpoint: self.endpoint.clone(),
            generation,
            kind,
        };
        if self.events.send(event).is_err() {
            tracing::trace!(endpoint = %self.endpoint, "link event dropped, nobody is listening");
        }
    }

    /// Socket of `generation`, if that connection is still up
    fn stream_for(&self, generation: u64) -> Option<Arc<TcpStream>> {
        let shared = self.lock();
        if shared.generation == generation && shared.state.is_connected() {
            shared.stream.clone()
        } else {
            None
        }
    }

    /// Moves connection `generation` to `Failed`. Returns false if it was already
    /// closed, failed or superseded by a newer attempt.
    fn fail(&self, generation: u64, reason: &str) -> bool {
        let stream = {
            let mut shared = self.lock();
            if shared.generation != generation || !shared.state.is_connected() {
                return false;
            }
            shared.state = ConnectionState::Failed(reason.to_string());
            shared.writer = None;
            shared.stream.take()
        };

        if let Some(stream) = stream {
            release(&stream);
        }
        tracing::warn!(endpoint = %self.endpoint, %reason, "connection failed");
        self.emit(
            generation,
            LinkEventKind::StateChanged(ConnectionState::Failed(reason.to_string())),
        );
        true
    }
}

/// Shuts the socket down so blocked reads and writes on other threads return.
/// The descriptor itself is closed when the last `Arc` goes away.
fn release(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        tracing::debug!("socket shutdown: {}", e);
    }
}

/// One TCP connection to one peer, and its lifecycle
pub struct PeerLink {
    core: LinkCore,
    options: LinkOptions,
}

impl PeerLink {
    /// A link in the `Idle` state. No I/O happens until [`PeerLink::connect`].
    pub fn new(endpoint: PeerEndpoint, options: LinkOptions, events: Sender<LinkEvent>) -> Self {
        let shared = Shared {
            state: ConnectionState::Idle,
            stream: None,
            writer: None,
            generation: 0,
        };
        Self {
            core: LinkCore {
                endpoint,
                shared: Arc::new(Mutex::new(shared)),
                events,
            },
            options,
        }
    }

    pub fn endpoint(&self) -> &PeerEndpoint {
        &self.core.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.core.lock().state.is_connected()
    }

    /// Number of the latest connection attempt, 0 before the first one
    pub fn generation(&self) -> u64 {
        self.core.lock().generation
    }

    /// Whether the link currently holds a socket handle
    pub fn holds_socket(&self) -> bool {
        self.core.lock().stream.is_some()
    }

    /// Dials the peer, blocking the caller until the attempt resolves.
    ///
    /// Allowed from `Idle`, `Closed` and `Failed`; a reconnect gets a fresh socket
    /// and fresh workers. Exactly one attempt is made.
    pub fn connect(&self) -> Result<(), ConnectError> {
        let generation = {
            let mut shared = self.core.lock();
            if !shared.state.can_connect() {
                return Err(ConnectError::AlreadyConnected);
            }
            shared.state = ConnectionState::Connecting;
            shared.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
            shared.generation
        };
        self.core.emit(
            generation,
            LinkEventKind::StateChanged(ConnectionState::Connecting),
        );
        tracing::info!(endpoint = %self.core.endpoint, "connecting");

        let stream = match self.dial() {
            Ok(stream) => stream,
            Err(err) => {
                self.core.lock().state = ConnectionState::Failed(err.to_string());
                tracing::warn!(endpoint = %self.core.endpoint, "connect failed: {}", err);
                self.core.emit(
                    generation,
                    LinkEventKind::StateChanged(ConnectionState::Failed(err.to_string())),
                );
                return Err(err);
            }
        };

        let stream = Arc::new(stream);
        let (frames_tx, frames_rx) = mpsc::channel();
        {
            let mut shared = self.core.lock();
            shared.state = ConnectionState::Connected;
            shared.stream = Some(Arc::clone(&stream));
            shared.writer = Some(frames_tx);
        }
        // announced before any worker exists, so a worker's failure always follows it
        tracing::info!(endpoint = %self.core.endpoint, "connected");
        self.core.emit(
            generation,
            LinkEventKind::StateChanged(ConnectionState::Connected),
        );

        let core = self.core.clone();
        thread::spawn(move || write_frames(core, generation, frames_rx));

        if self.options.receive {
            let core = self.core.clone();
            thread::spawn(move || read_frames(core, generation, stream));
        }
        Ok(())
    }

    /// Queues `text` as one frame and returns without waiting for the write.
    ///
    /// Empty text is ignored. Write failures arrive later as
    /// [`LinkEventKind::WriteFailed`].
    pub fn send(&self, text: &str) -> Result<(), SendError> {
        if text.is_empty() {
            return Ok(());
        }
        let frame = protocol::encode_frame(text)?;

        let shared = self.core.lock();
        if !shared.state.is_connected() {
            return Err(SendError::NotConnected);
        }
        let writer = shared.writer.as_ref().ok_or(SendError::NotConnected)?;
        writer.send(frame).map_err(|_| SendError::NotConnected)?;
        tracing::trace!(endpoint = %self.core.endpoint, "frame queued");
        Ok(())
    }

    /// Closes the connection. Does nothing unless the link is connected, so it is
    /// safe to call any number of times.
    pub fn close(&self) {
        let (generation, stream) = {
            let mut shared = self.core.lock();
            if !shared.state.is_connected() {
                return;
            }
            shared.state = ConnectionState::Closed;
            shared.writer = None;
            (shared.generation, shared.stream.take())
        };

        if let Some(stream) = stream {
            release(&stream);
        }
        tracing::info!(endpoint = %self.core.endpoint, "connection closed");
        self.core
            .emit(generation, LinkEventKind::StateChanged(ConnectionState::Closed));
    }

    fn dial(&self) -> Result<TcpStream, ConnectError> {
        let endpoint = &self.core.endpoint;
        let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
            .to_socket_addrs()
            .map_err(|e| ConnectError::Resolve {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ConnectError::Resolve {
                endpoint: endpoint.to_string(),
                reason: "no addresses found".to_string(),
            });
        }

        let result = match self.options.connect_timeout {
            None => TcpStream::connect(&addrs[..]),
            Some(timeout) => connect_any(&addrs, timeout),
        };

        let stream = result.map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectError::TimedOut {
                endpoint: endpoint.to_string(),
            },
            _ => ConnectError::Dial {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            },
        })?;

        if let Err(e) = stream.set_write_timeout(self.options.write_timeout) {
            tracing::debug!("could not set write timeout: {}", e);
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("could not set TCP_NODELAY: {}", e);
        }
        Ok(stream)
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("endpoint", &self.core.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no addresses")))
}

/// Writer worker: the only code that writes to a link's socket, one frame at a
/// time in queue order. The socket is borrowed per frame, never kept.
fn write_frames(core: LinkCore, generation: u64, frames: Receiver<Vec<u8>>) {
    for frame in frames {
        let Some(stream) = core.stream_for(generation) else {
            core.emit(
                generation,
                LinkEventKind::WriteFailed(SendError::WriteFailed {
                    reason: "connection closed before the message was written".to_string(),
                }),
            );
            continue;
        };

        let mut writer: &TcpStream = &stream;
        let result = writer.write_all(&frame).and_then(|_| writer.flush());
        drop(stream);

        match result {
            Ok(()) => {
                tracing::trace!(endpoint = %core.endpoint, bytes = frame.len(), "frame written");
                core.emit(generation, LinkEventKind::Written { bytes: frame.len() });
            }
            Err(e) => {
                let reason = e.to_string();
                core.fail(generation, &reason);
                core.emit(
                    generation,
                    LinkEventKind::WriteFailed(SendError::WriteFailed { reason }),
                );
            }
        }
    }
    tracing::debug!(endpoint = %core.endpoint, generation, "writer stopped");
}

/// Reader worker, only started when receiving is enabled
fn read_frames(core: LinkCore, generation: u64, stream: Arc<TcpStream>) {
    let mut reader = FrameReader::new(&*stream);
    loop {
        match reader.next_frame() {
            Ok(Some(text)) => {
                tracing::debug!(endpoint = %core.endpoint, "received {} bytes", text.len());
                core.emit(generation, LinkEventKind::Inbound(text));
            }
            Ok(None) => {
                core.fail(generation, "peer closed the connection");
                break;
            }
            Err(e) => {
                core.fail(generation, &e.to_string());
                break;
            }
        }
    }
    tracing::debug!(endpoint = %core.endpoint, generation, "reader stopped");
}
