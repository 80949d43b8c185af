//! Configuration types for the sender, the listener and the console binary.
//!
//! [`SenderConfig`] and [`ReceiverConfig`] are plain structs filled in before
//! first use.  Missing fields are not rejected here; the components report
//! `InvalidState` when they are actually asked to connect or bind, so a
//! half-built config can be passed around and completed later.
//!
//! [`AppConfig`] is the optional on-disk TOML file read by the `textwire`
//! binary.  Every field has a default, so an empty file is valid:
//!
//! ```toml
//! log_level = "debug"
//!
//! [local]
//! address = "127.0.0.1"
//! port = 1000
//!
//! [remote]
//! host = "127.0.0.1"
//! port = 1001
//!
//! [limits]
//! read_chunk_size = 10000
//! max_frame_bytes = 1048576   # 0 = unbounded
//! connect_timeout_ms = 5000   # 0 = wait forever
//! write_timeout_ms = 5000
//! idle_timeout_ms = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::error::{ConfigError, TransportError};

/// Bytes requested from the socket per read on an inbound connection.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 10_000;

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A `host:port` pair as typed on the command line.
///
/// The host is kept as a string because the sender accepts domain names as
/// well as literal addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses `host:port`, splitting on the last colon.  IPv6 literals may be
    /// written in brackets (`[::1]:1000`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] if the colon is missing, the
    /// host is empty, or the port is not a number in `1..=65535`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use textwire_net::domain::Endpoint;
    ///
    /// let ep = Endpoint::parse("127.0.0.1:1100").unwrap();
    /// assert_eq!(ep.host, "127.0.0.1");
    /// assert_eq!(ep.port, 1100);
    /// ```
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port must be between 1 and 65535"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// Target and timeouts for a [`FramedSender`](crate::infrastructure::FramedSender).
#[derive(Debug, Clone, Default)]
pub struct SenderConfig {
    /// Domain name or literal IP address of the remote listener.
    pub host: Option<String>,
    /// Remote port; `0` counts as unset.
    pub port: Option<u16>,
    /// Upper bound on establishing a connection.  `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Upper bound on writing one frame.  `None` waits indefinitely.
    pub write_timeout: Option<Duration>,
}

impl SenderConfig {
    /// A config pointing at `host:port` with no timeouts.
    pub fn targeting(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Returns the configured target.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidState`] if the host or port is unset.
    pub fn target(&self) -> Result<(&str, u16), TransportError> {
        let port = match self.port {
            Some(port) if port != 0 => port,
            _ => return Err(TransportError::InvalidState("port is empty".into())),
        };
        match self.host.as_deref() {
            Some(host) if !host.is_empty() => Ok((host, port)),
            _ => Err(TransportError::InvalidState("host is empty".into())),
        }
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// Bind address and per-connection limits for a
/// [`FramedReceiver`](crate::infrastructure::FramedReceiver).
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Literal IP address to listen on.
    pub address: Option<String>,
    /// Local port; `0` counts as unset.
    pub port: Option<u16>,
    /// Bytes requested from the socket per read.
    pub read_chunk_size: usize,
    /// Largest body a header may announce.  `None` trusts every header, which
    /// lets a single peer allocate up to 4 GiB.
    pub max_body_len: Option<u32>,
    /// Drop a connection that sends nothing for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_body_len: None,
            idle_timeout: None,
        }
    }
}

impl ReceiverConfig {
    /// A config listening on `address:port` with default limits.
    pub fn bound_to(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: Some(address.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Returns the configured bind target.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidState`] if the address or port is
    /// unset.
    pub fn bind_target(&self) -> Result<(&str, u16), TransportError> {
        let port = match self.port {
            Some(port) if port != 0 => port,
            _ => return Err(TransportError::InvalidState("port is empty".into())),
        };
        match self.address.as_deref() {
            Some(address) if !address.is_empty() => Ok((address, port)),
            _ => Err(TransportError::InvalidState("address is empty".into())),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

/// Top-level schema of the optional `textwire` TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where to listen for incoming messages.
    #[serde(default)]
    pub local: Option<LocalSection>,
    /// Where to send outgoing messages.
    #[serde(default)]
    pub remote: Option<RemoteSection>,
    #[serde(default)]
    pub limits: LimitsSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocalSection {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteSection {
    pub host: String,
    pub port: u16,
}

/// Limits and timeouts.  Zero disables the corresponding limit.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LimitsSection {
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    #[serde(default)]
    pub max_frame_bytes: u32,
    #[serde(default)]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_bytes: 0,
            connect_timeout_ms: 0,
            write_timeout_ms: 0,
            idle_timeout_ms: 0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            local: None,
            remote: None,
            limits: LimitsSection::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn nonzero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl AppConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or does
    /// not match the schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Builds the listener config from the `[local]` and `[limits]` sections.
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            address: self.local.as_ref().map(|l| l.address.clone()),
            port: self.local.as_ref().map(|l| l.port),
            read_chunk_size: self.limits.read_chunk_size.max(1),
            max_body_len: (self.limits.max_frame_bytes > 0).then_some(self.limits.max_frame_bytes),
            idle_timeout: nonzero_ms(self.limits.idle_timeout_ms),
        }
    }

    /// Builds the sender config from the `[remote]` and `[limits]` sections.
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            host: self.remote.as_ref().map(|r| r.host.clone()),
            port: self.remote.as_ref().map(|r| r.port),
            connect_timeout: nonzero_ms(self.limits.connect_timeout_ms),
            write_timeout: nonzero_ms(self.limits.write_timeout_ms),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
