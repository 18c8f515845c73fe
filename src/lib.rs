//! Terminal chat over a single outbound TCP connection.
//!
//! Messages are newline-terminated UTF-8 lines on a bare TCP stream.

pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
