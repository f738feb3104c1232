//! Wire representation and message framing for platch channels.
//!
//! Two layers live here:
//! - [`WireValue`] — the tagged union every value crossing a channel
//!   boundary is reduced to, with a compact binary encoding
//! - [`Frame`] — one transport unit: a channel name plus an encoded
//!   payload, length-prefixed with a 2-byte magic for stream
//!   synchronization
//!
//! No partial reads, no buffer management in user code.

pub mod error;
pub mod frame;
pub mod reader;
pub mod value;
pub mod writer;

pub use error::{Result, WireError};
pub use frame::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAX_CHANNEL_NAME,
};
pub use reader::FrameReader;
pub use value::{decode_value, encode_value, value_to_bytes, WireValue, MAX_VALUE_DEPTH};
pub use writer::FrameWriter;
