//! Domain layer for textwire-net.
//!
//! Pure types with no sockets or async: configuration, the message events the
//! listener produces, and the error taxonomy shared by sender and listener.

pub mod config;
pub mod error;
pub mod events;

pub use config::{AppConfig, Endpoint, ReceiverConfig, SenderConfig, DEFAULT_READ_CHUNK_SIZE};
pub use error::{ConfigError, TransportError};
pub use events::{ConnectionInfo, MessageEvent};
