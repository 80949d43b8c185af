//! Infrastructure layer for textwire-net.
//!
//! Everything that touches a socket lives here.
//!
//! # Responsibilities
//!
//! - Opening, reusing and resetting the outbound connection ([`sender`])
//! - Binding the listener and spawning one reassembly task per accepted
//!   connection ([`receiver`])
//! - Delivering reassembled messages to the caller ([`handler`])
//!
//! Frame layout and reassembly rules are not defined here; they come from
//! `textwire-core`.

pub mod handler;
pub mod receiver;
pub mod sender;

pub use handler::{ChannelHandler, MessageHandler};
pub use receiver::{read_messages, ConnectionOutcome, FramedReceiver};
pub use sender::FramedSender;
