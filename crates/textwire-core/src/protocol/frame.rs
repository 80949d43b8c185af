//! Binary codec for textwire frames.
//!
//! Wire format:
//! ```text
//! [body_len:4][body:N]
//! ```
//! `body_len` is an unsigned 32-bit little-endian integer giving the exact
//! byte length of the UTF-8 encoded body (bytes, not characters).  There is no
//! magic number, version byte or checksum: the length prefix is the only
//! message boundary on the stream.

use thiserror::Error;

/// Size of the length prefix that precedes every body.
pub const HEADER_SIZE: usize = 4;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The body does not fit in the 32-bit length field.
    #[error("message body of {len} bytes exceeds the 32-bit length field")]
    BodyTooLong { len: usize },

    /// The header announces a body larger than the configured cap.
    #[error("frame too large: header declares {declared} bytes, limit is {max}")]
    FrameTooLarge { declared: u32, max: u32 },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Builds the 4-byte little-endian header for a body of `body_len` bytes.
///
/// # Errors
///
/// Returns [`FrameError::BodyTooLong`] if `body_len` does not fit in a `u32`.
///
/// # Examples
///
/// ```rust
/// use textwire_core::encode_header;
///
/// assert_eq!(encode_header(5).unwrap(), [5, 0, 0, 0]);
/// assert_eq!(encode_header(0x0102).unwrap(), [0x02, 0x01, 0, 0]);
/// ```
pub fn encode_header(body_len: usize) -> Result<[u8; HEADER_SIZE], FrameError> {
    let len = u32::try_from(body_len).map_err(|_| FrameError::BodyTooLong { len: body_len })?;
    Ok(len.to_le_bytes())
}

/// Encodes `text` into a complete frame (header followed by UTF-8 body).
///
/// The sender writes header and body as two separate writes; this helper is
/// for callers that want the whole frame in one buffer.
///
/// # Errors
///
/// Returns [`FrameError::BodyTooLong`] if the UTF-8 encoding of `text` is
/// longer than `u32::MAX` bytes.
///
/// # Examples
///
/// ```rust
/// use textwire_core::encode_frame;
///
/// let frame = encode_frame("hé").unwrap();
/// // "é" is two bytes in UTF-8, so the body is three bytes long.
/// assert_eq!(frame, vec![3, 0, 0, 0, b'h', 0xC3, 0xA9]);
/// ```
pub fn encode_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    let body = text.as_bytes();
    let header = encode_header(body.len())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Reads the body length from the first four bytes of `bytes`.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] if fewer than four bytes are
/// available.
pub fn decode_header(bytes: &[u8]) -> Result<u32, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decodes a frame body as UTF-8 text.
///
/// Invalid sequences are replaced with U+FFFD rather than rejected, so a
/// corrupt body costs one garbled message instead of the whole connection.
pub fn decode_body(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
