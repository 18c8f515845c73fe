use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EndpointError;

/// Host used when the operator leaves the target empty
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when the operator leaves the port empty or types garbage
pub const DEFAULT_PORT: u16 = 5555;

/// Address of a chat peer. Two endpoints are the same peer when host and port match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEndpoint {
    host: String,
    port: u16,
}

impl PeerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for PeerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host`, `host:port` or `[v6]:port`. A missing port means [`DEFAULT_PORT`].
impl FromStr for PeerEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or(EndpointError::EmptyHost)?;
            return match tail.strip_prefix(':') {
                Some(port) => Self::new(host, parse_port(port)?),
                None if tail.is_empty() => Self::new(host, DEFAULT_PORT),
                None => Err(EndpointError::InvalidPort(tail.to_string())),
            };
        }

        match s.rsplit_once(':') {
            // a bare IPv6 address has several colons and no port
            Some((host, _)) if host.contains(':') => Self::new(s, DEFAULT_PORT),
            Some((host, port)) => Self::new(host, parse_port(port)?),
            None => Self::new(s, DEFAULT_PORT),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, EndpointError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(EndpointError::InvalidPort(raw.trim().to_string())),
    }
}

/// Lifecycle of a peer connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Closed,
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a new connection attempt may start from this state
    pub fn can_connect(&self) -> bool {
        !matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Which way a message travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// One entry of the transcript. Never modified after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub direction: Direction,
    pub text: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(direction: Direction, text: String, sequence: u64) -> Self {
        Self {
            direction,
            text,
            sequence,
            timestamp: Utc::now(),
        }
    }
}
