//! # textwire-core
//!
//! Shared protocol library for textwire: the wire format for discrete UTF-8
//! text messages carried over a TCP byte stream, and the reassembly buffer
//! that turns arbitrarily fragmented reads back into whole messages.
//!
//! This crate has zero dependencies on sockets or async runtimes, so every
//! piece of it can be exercised with plain byte slices.
//!
//! # Architecture overview
//!
//! TCP delivers a continuous stream of bytes, not messages.  A sender that
//! writes `"hello"` and then `"world"` may see the receiver read `"hellowor"`
//! followed by `"ld"`.  textwire restores the boundaries with a length prefix:
//!
//! ```text
//! Frame := Header(4 bytes, u32 little-endian = body length) ++ Body(UTF-8)
//! ```
//!
//! - **`protocol::frame`** – Encodes a message into header + body and decodes
//!   the individual pieces.
//! - **`protocol::reassembly`** – A per-connection accumulator that extracts
//!   zero or more complete frames from whatever bytes have arrived so far.

pub mod protocol;

pub use protocol::frame::{
    decode_body, decode_header, encode_frame, encode_header, FrameError, HEADER_SIZE,
};
pub use protocol::reassembly::ReassemblyBuffer;
