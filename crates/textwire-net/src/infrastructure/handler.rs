//! Message handlers: where reassembled messages go.
//!
//! The listener takes exactly one [`MessageHandler`] at construction.  Two
//! ready-made adapters cover the common cases:
//!
//! - any closure `Fn(&MessageEvent) -> anyhow::Result<()>`;
//! - [`ChannelHandler`], which forwards events to an unbounded `mpsc` channel
//!   so the caller can consume them as a stream.
//!
//! Handlers run synchronously inside the connection's reassembly task.  A
//! slow handler delays further extraction on that connection only.

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::MessageEvent;

/// Receives every message reassembled by the listener.
#[cfg_attr(test, mockall::automock)]
pub trait MessageHandler: Send + Sync {
    /// Called once per complete frame, in arrival order per connection.
    ///
    /// # Errors
    ///
    /// A returned error is logged by the listener and otherwise ignored; it
    /// never closes the connection.
    fn on_message(&self, event: &MessageEvent) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&MessageEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_message(&self, event: &MessageEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<MessageEvent>,
}

impl ChannelHandler {
    /// Creates the handler together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageHandler for ChannelHandler {
    fn on_message(&self, event: &MessageEvent) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow!("event receiver dropped"))
    }
}

/// Invokes `handler`, containing both returned errors and panics.
///
/// Returns `true` if the handler completed successfully.
pub(crate) fn deliver(handler: &dyn MessageHandler, event: &MessageEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| handler.on_message(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(connection = %event.connection, "message handler failed: {e:#}");
            false
        }
        Err(_) => {
            warn!(connection = %event.connection, "message handler panicked");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
