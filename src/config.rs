//! Client configuration: the startup prompt for the target peer plus
//! environment overrides for link behaviour and logging.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::link::LinkOptions;
use crate::common::{PeerEndpoint, DEFAULT_HOST, DEFAULT_PORT};
use crate::error::ConfigError;

pub const ENV_CONNECT_TIMEOUT: &str = "PEERCHAT_CONNECT_TIMEOUT_SECS";
pub const ENV_WRITE_TIMEOUT: &str = "PEERCHAT_WRITE_TIMEOUT_SECS";
pub const ENV_RECEIVE: &str = "PEERCHAT_RECEIVE";
pub const ENV_LOG_FILE: &str = "PEERCHAT_LOG";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

const DEFAULT_LOG_FILE: &str = "peerchat.log";
const DEFAULT_LOG_FILTER: &str = "info";
/// Bounds how long a stalled peer can hold the writer, and with it the frame queue
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the client binary needs before the interactive loop starts
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: PeerEndpoint,
    pub link: LinkOptions,
    pub log_file: PathBuf,
    pub log_filter: String,
}

impl ClientConfig {
    /// Reads overrides from the process environment
    pub fn from_env(endpoint: PeerEndpoint) -> Result<Self, ConfigError> {
        Self::from_lookup(endpoint, |key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup
    pub fn from_lookup<F>(endpoint: PeerEndpoint, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let link = LinkOptions {
            connect_timeout: parse_seconds(ENV_CONNECT_TIMEOUT, lookup(ENV_CONNECT_TIMEOUT), None)?,
            write_timeout: parse_seconds(
                ENV_WRITE_TIMEOUT,
                lookup(ENV_WRITE_TIMEOUT),
                Some(DEFAULT_WRITE_TIMEOUT),
            )?,
            receive: parse_flag(ENV_RECEIVE, lookup(ENV_RECEIVE), true)?,
        };

        Ok(Self {
            endpoint,
            link,
            log_file: lookup(ENV_LOG_FILE)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            log_filter: lookup(ENV_LOG_FILTER)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

/// Empty input falls back to [`DEFAULT_HOST`]
pub fn host_or_default(input: &str) -> String {
    let host = input.trim();
    if host.is_empty() {
        DEFAULT_HOST.to_string()
    } else {
        host.to_string()
    }
}

/// Empty, unparseable or zero input falls back to [`DEFAULT_PORT`]
pub fn port_or_default(input: &str) -> u16 {
    match input.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => DEFAULT_PORT,
    }
}

/// Asks for the target host and port on the console.
///
/// A host typed with a port (`10.0.0.2:6000`) wins over the second prompt's
/// default, but an explicit answer to the port prompt still overrides it.
pub fn prompt_target<R, W>(input: &mut R, output: &mut W) -> io::Result<PeerEndpoint>
where
    R: BufRead,
    W: Write,
{
    write!(output, "Target host (default: {}): ", DEFAULT_HOST)?;
    output.flush()?;
    let mut host = String::new();
    input.read_line(&mut host)?;

    write!(output, "Port (default: {}): ", DEFAULT_PORT)?;
    output.flush()?;
    let mut port = String::new();
    input.read_line(&mut port)?;

    let host = host_or_default(&host);
    let from_host = host.parse::<PeerEndpoint>().ok();
    let endpoint = match (from_host, port.trim().is_empty()) {
        (Some(endpoint), true) => Ok(endpoint),
        (Some(endpoint), false) => PeerEndpoint::new(endpoint.host(), port_or_default(&port)),
        (None, _) => PeerEndpoint::new(host, port_or_default(&port)),
    };

    Ok(endpoint.unwrap_or_default())
}

/// Unset or empty keeps `default`, `0` turns the timeout off
fn parse_seconds(
    key: &str,
    value: Option<String>,
    default: Option<Duration>,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}
