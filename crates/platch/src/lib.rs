//! Typed method and event channels over framed byte streams.
//!
//! platch multiplexes named request/response and event-stream channels
//! over one ordered byte stream, with a compact self-describing value
//! encoding.
//!
//! # Crate Structure
//!
//! - [`wire`] — Frame layout and the tagged binary value encoding
//! - [`codec`] — Typed record/enum glue and shape validation on top of
//!   wire values
//! - [`channel`] — The channel host: method channels, event channels,
//!   registry, scheduling

/// Re-export wire types.
pub mod wire {
    pub use platch_wire::*;
}

/// Re-export codec types.
pub mod codec {
    pub use platch_codec::*;
}

/// Re-export channel types.
pub mod channel {
    pub use platch_channel::*;
}
