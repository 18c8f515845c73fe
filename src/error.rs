//! Error types for links, sessions and configuration

use thiserror::Error;

/// Invalid peer address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("invalid port '{0}', expected 1-65535")]
    InvalidPort(String),
}

/// Failure to establish a connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The link is already connecting or connected; no I/O was attempted
    #[error("already connected")]
    AlreadyConnected,

    #[error("could not resolve {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },

    #[error("connection to {endpoint} failed: {reason}")]
    Dial { endpoint: String, reason: String },

    #[error("connection to {endpoint} timed out")]
    TimedOut { endpoint: String },
}

/// A chat line that cannot be carried by one frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("message contains a line break")]
    EmbeddedNewline,
}

/// Failure to send a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,

    /// Reported through the link event channel, never from `send` itself
    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
}

/// Registry precondition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("peer {0} is not registered")]
    NotRegistered(String),

    #[error("peer {0} is not connected")]
    NotConnected(String),
}

/// Failures surfaced by chat session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no peer selected")]
    NoPeer,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

/// Transcript export failures
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Bad configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
