//! Error taxonomy for the sender and the listener.

use std::path::PathBuf;

use textwire_core::FrameError;
use thiserror::Error;

/// Errors surfaced by [`FramedSender`](crate::infrastructure::FramedSender)
/// and [`FramedReceiver`](crate::infrastructure::FramedReceiver).
///
/// Benign disconnects (a zero-length read, a listener that was stopped on
/// purpose) are not errors and never appear here.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The caller passed an unusable argument, e.g. an empty message.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Required configuration is missing, or the component is in the wrong
    /// lifecycle state for the call.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Connecting to, or writing to, the remote party failed.  The sender has
    /// already discarded the connection; the next send reconnects.
    #[error("connection to {addr} failed: {source}")]
    ConnectionFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener could not be bound (unparsable address, port in use, ...).
    #[error("failed to bind listener on {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The message could not be framed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors raised while building configuration from files or arguments.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An endpoint string is not of the form `host:port`.
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: &'static str },

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
