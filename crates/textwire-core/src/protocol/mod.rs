//! Protocol module containing the frame codec and the reassembly buffer.

pub mod frame;
pub mod reassembly;

pub use frame::{decode_body, decode_header, encode_frame, encode_header, FrameError, HEADER_SIZE};
pub use reassembly::ReassemblyBuffer;
