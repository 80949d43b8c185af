//! textwire-net library crate.
//!
//! Point-to-point text messaging over TCP using the length-prefixed frames
//! defined in `textwire-core`.
//!
//! # Architecture
//!
//! ```text
//! caller ── send(text) ──> [FramedSender] ══ TCP ══> [FramedReceiver]
//!                           one lazy socket            accept loop
//!                           behind a mutex              └─ one reassembly task
//!                                                          per connection
//!                                                             └─ MessageHandler
//! ```
//!
//! - `domain/`          Configuration, message events, error types
//! - `infrastructure/`  Sender, listener, handler adapters
//!
//! # Example
//!
//! ```no_run
//! use textwire_net::domain::{ReceiverConfig, SenderConfig};
//! use textwire_net::infrastructure::{FramedReceiver, FramedSender};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (mut receiver, mut events) =
//!     FramedReceiver::with_channel(ReceiverConfig::bound_to("127.0.0.1", 1100));
//! receiver.start().await?;
//!
//! let sender = FramedSender::new(SenderConfig::targeting("127.0.0.1", 1100));
//! sender.send("hello").await?;
//!
//! let event = events.recv().await.expect("listener running");
//! assert_eq!(event.text, "hello");
//! receiver.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration, events and errors (no I/O).
pub mod domain;

/// Infrastructure layer: TCP sender, listener and handler adapters.
pub mod infrastructure;
