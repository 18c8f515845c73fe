use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Sender, TryRecvError};

use serde::Serialize;
use uuid::Uuid;

use crate::client::link::{event_channel, LinkEvent, LinkEventKind, LinkEvents, LinkOptions, PeerLink};
use crate::client::registry::ConnectionRegistry;
use crate::common::{ChatMessage, ConnectionState, Direction, PeerEndpoint};
use crate::error::{ExportError, SendError, SessionError};

/// Append-only message log. Sequence numbers start at 1 and have no gaps.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, direction: Direction, text: impl Into<String>) -> &ChatMessage {
        let sequence = self.messages.len() as u64 + 1;
        self.messages
            .push(ChatMessage::new(direction, text.into(), sequence));
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Requests from the interactive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SubmitMessage(String),
    RequestConnect,
    RequestDisconnect,
    AddPeer(PeerEndpoint),
    SelectNext,
    SelectPrevious,
    Export(PathBuf),
    Quit,
}

/// Whether the loop keeps going after an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read-only snapshot handed to the renderer
#[derive(Debug)]
pub struct SessionView<'a> {
    pub endpoint: Option<&'a PeerEndpoint>,
    pub state: ConnectionState,
    pub transcript: &'a [ChatMessage],
    pub peers: &'a [PeerEndpoint],
    pub selected: usize,
    pub active: Option<usize>,
    pub notice: Option<&'a str>,
}

#[derive(Serialize)]
struct TranscriptExport<'a> {
    session_id: Uuid,
    peer: Option<&'a PeerEndpoint>,
    messages: &'a [ChatMessage],
}

/// The one chat session of a run: known peers, the active link and the transcript.
///
/// Only the thread that owns the session mutates the transcript; link workers
/// talk to it through the event channel drained by [`ChatSession::poll_events`].
pub struct ChatSession {
    id: Uuid,
    options: LinkOptions,
    registry: ConnectionRegistry,
    link: Option<PeerLink>,
    transcript: Transcript,
    events_tx: Sender<LinkEvent>,
    events: LinkEvents,
    notice: Option<String>,
}

impl ChatSession {
    pub fn new(options: LinkOptions) -> Self {
        let (events_tx, events) = event_channel();
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "chat session created");
        Self {
            id,
            options,
            registry: ConnectionRegistry::new(),
            link: None,
            transcript: Transcript::new(),
            events_tx,
            events,
            notice: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Registers a peer and selects it
    pub fn add_peer(&mut self, endpoint: PeerEndpoint) {
        self.registry.register(endpoint.clone());
        // just registered, cannot fail
        let _ = self.registry.select(&endpoint);
    }

    /// State of the current link, `Idle` when there is none
    pub fn state(&self) -> ConnectionState {
        self.link
            .as_ref()
            .map(PeerLink::state)
            .unwrap_or_default()
    }

    pub fn active_endpoint(&self) -> Option<&PeerEndpoint> {
        self.link.as_ref().map(PeerLink::endpoint)
    }

    /// Connects to the selected peer.
    ///
    /// A different peer than the current one replaces the current link, which is
    /// closed first so that at most one link is ever connected.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        let target = self.registry.selected().cloned().ok_or(SessionError::NoPeer)?;

        let reuse = matches!(&self.link, Some(link) if link.endpoint() == &target);
        if !reuse {
            if let Some(old) = self.link.take() {
                old.close();
                self.registry.deactivate(old.endpoint());
            }
            self.link = Some(PeerLink::new(
                target.clone(),
                self.options.clone(),
                self.events_tx.clone(),
            ));
        }

        let Some(link) = self.link.as_ref() else {
            return Err(SessionError::NoPeer);
        };
        link.connect()?;
        self.registry.set_active(link)?;
        Ok(())
    }

    /// Closes the current link, if connected
    pub fn disconnect(&mut self) {
        if let Some(link) = &self.link {
            link.close();
            self.registry.deactivate(link.endpoint());
        }
    }

    /// Records and sends an outbound message.
    ///
    /// Empty text does nothing. Without a connected link nothing is recorded and
    /// nothing is queued. On success the message is in the transcript before its
    /// bytes are written; a later write failure does not take it back out.
    pub fn submit(&mut self, text: &str) -> Result<Option<u64>, SendError> {
        if text.is_empty() {
            return Ok(None);
        }
        let link = self
            .link
            .as_ref()
            .filter(|link| link.is_connected())
            .ok_or(SendError::NotConnected)?;

        link.send(text)?;
        let sequence = self.transcript.append(Direction::Outbound, text).sequence;
        Ok(Some(sequence))
    }

    /// Drains pending link events. Returns how many were handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.apply_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Whether `event` comes from the connection attempt the session holds now.
    /// Anything older belongs to a socket that has already been replaced.
    fn is_current(&self, event: &LinkEvent) -> bool {
        self.link.as_ref().is_some_and(|link| {
            link.endpoint() == &event.endpoint && link.generation() == event.generation
        })
    }

    fn apply_event(&mut self, event: LinkEvent) {
        let current = self.is_current(&event);
        match event.kind {
            LinkEventKind::Inbound(text) if current => {
                self.transcript.append(Direction::Inbound, text);
            }
            LinkEventKind::Inbound(_) => {
                tracing::debug!(endpoint = %event.endpoint, "dropping line from a replaced link");
            }
            LinkEventKind::StateChanged(state) if !current => {
                tracing::debug!(endpoint = %event.endpoint, state = state.label(), "stale state change ignored");
            }
            LinkEventKind::StateChanged(ConnectionState::Failed(reason)) => {
                let was_active = self.registry.active() == Some(&event.endpoint);
                self.registry.deactivate(&event.endpoint);
                if was_active {
                    self.notice = Some(format!("connection to {} lost: {}", event.endpoint, reason));
                }
            }
            LinkEventKind::StateChanged(ConnectionState::Closed) => {
                self.registry.deactivate(&event.endpoint);
            }
            LinkEventKind::StateChanged(_) => {}
            LinkEventKind::WriteFailed(err) => {
                tracing::warn!(endpoint = %event.endpoint, "{}", err);
                self.notice = Some(format!("message to {} not delivered: {}", event.endpoint, err));
            }
            LinkEventKind::Written { bytes } => {
                tracing::trace!(endpoint = %event.endpoint, bytes, "delivered");
            }
        }
    }

    /// Applies one intent. Failures end up in the notice, never in a panic.
    pub fn handle(&mut self, intent: Intent) -> Flow {
        match intent {
            Intent::SubmitMessage(text) => match self.submit(&text) {
                Ok(_) => {}
                Err(err) => self.set_notice(err),
            },
            Intent::RequestConnect => match self.connect() {
                Ok(()) => {
                    self.notice = self
                        .active_endpoint()
                        .map(|endpoint| format!("connected to {}", endpoint));
                }
                Err(err) => self.set_notice(err),
            },
            Intent::RequestDisconnect => {
                if self.state().is_connected() {
                    self.disconnect();
                    self.notice = Some("disconnected".to_string());
                } else {
                    self.notice = Some("no active connection".to_string());
                }
            }
            Intent::AddPeer(endpoint) => {
                self.notice = Some(format!("added peer {}", endpoint));
                self.add_peer(endpoint);
            }
            Intent::SelectNext => self.registry.select_next(),
            Intent::SelectPrevious => self.registry.select_previous(),
            Intent::Export(path) => match self.export(&path) {
                Ok(()) => self.notice = Some(format!("transcript saved to {}", path.display())),
                Err(err) => self.set_notice(SessionError::from(err)),
            },
            Intent::Quit => {
                self.shutdown();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn set_notice(&mut self, err: impl Into<SessionError>) {
        let err = err.into();
        tracing::warn!("{}", err);
        self.notice = Some(err.to_string());
    }

    /// Writes the transcript as pretty JSON
    pub fn export(&self, path: &Path) -> Result<(), ExportError> {
        let export = TranscriptExport {
            session_id: self.id,
            peer: self.active_endpoint(),
            messages: self.transcript.messages(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &export)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        tracing::info!(path = %path.display(), messages = self.transcript.len(), "transcript exported");
        Ok(())
    }

    /// Closes the link before the process goes away
    pub fn shutdown(&mut self) {
        self.disconnect();
        tracing::info!(session = %self.id, "session finished");
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            endpoint: self.active_endpoint(),
            state: self.state(),
            transcript: self.transcript.messages(),
            peers: self.registry.endpoints(),
            selected: self.registry.selected_index(),
            active: self.registry.active_index(),
            notice: self.notice(),
        }
    }
}
