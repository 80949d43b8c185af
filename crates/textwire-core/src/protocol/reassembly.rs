//! Per-connection stream reassembly.
//!
//! TCP is a *stream* protocol: a single `read()` call may return less than one
//! complete frame, exactly one, or several frames followed by the start of the
//! next one.  [`ReassemblyBuffer`] accumulates whatever bytes arrive and hands
//! back complete messages one at a time.
//!
//! # Buffer lifecycle
//!
//! ```text
//! extend(chunk)          [hdr|body.........|hdr|bo]
//! next_frame() -> Some   [hdr|bo]                    remainder shifted to 0
//! next_frame() -> None   [hdr|bo]                    wait for more bytes
//! extend(chunk)          [hdr|body]
//! next_frame() -> Some   []
//! ```
//!
//! The buffer is owned by exactly one connection task, so no locking is
//! involved.

use tracing::trace;

use crate::protocol::frame::{decode_body, decode_header, FrameError, HEADER_SIZE};

/// Append-then-compact byte accumulator for one inbound connection.
///
/// # Examples
///
/// ```rust
/// use textwire_core::{encode_frame, ReassemblyBuffer};
///
/// let frame = encode_frame("hello").unwrap();
/// let mut buf = ReassemblyBuffer::new(None);
///
/// buf.extend(&frame[..6]);
/// assert_eq!(buf.next_frame().unwrap(), None);
///
/// buf.extend(&frame[6..]);
/// assert_eq!(buf.next_frame().unwrap().as_deref(), Some("hello"));
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buf: Vec<u8>,
    max_body_len: Option<u32>,
}

impl ReassemblyBuffer {
    /// Creates an empty buffer.
    ///
    /// `max_body_len` caps the body length a header may announce.  `None`
    /// trusts the header as given, which lets a peer make the buffer grow up
    /// to 4 GiB for a single frame.
    pub fn new(max_body_len: Option<u32>) -> Self {
        Self {
            buf: Vec::new(),
            max_body_len,
        }
    }

    /// Appends bytes read from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extracts the next complete message, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffer needs more bytes before a frame can
    /// be extracted.  A header is only inspected once more than
    /// [`HEADER_SIZE`] bytes are buffered, so a lone zero-length frame stays
    /// pending until something follows it.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::FrameTooLarge`] when a cap is configured and the
    /// header announces a larger body.  The buffer is left untouched; the
    /// connection is not recoverable at that point.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        if self.buf.len() <= HEADER_SIZE {
            return Ok(None);
        }

        let body_len = decode_header(&self.buf)?;
        if let Some(max) = self.max_body_len {
            if body_len > max {
                return Err(FrameError::FrameTooLarge {
                    declared: body_len,
                    max,
                });
            }
        }

        let frame_len = HEADER_SIZE + body_len as usize;
        if self.buf.len() < frame_len {
            trace!(
                buffered = self.buf.len(),
                needed = frame_len,
                "partial frame buffered"
            );
            return Ok(None);
        }

        let text = decode_body(&self.buf[HEADER_SIZE..frame_len]);
        self.consume(frame_len);
        Ok(Some(text))
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The configured body-length cap, if any.
    pub fn max_body_len(&self) -> Option<u32> {
        self.max_body_len
    }

    /// Drops the first `n` bytes: the remainder is shifted to offset 0 and
    /// the logical length shrinks to the remainder size.
    fn consume(&mut self, n: usize) {
        let remainder = self.buf.len() - n;
        if remainder > 0 {
            self.buf.copy_within(n.., 0);
        }
        self.buf.truncate(remainder);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
