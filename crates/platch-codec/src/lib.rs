//! Typed conversion between domain records and [`WireValue`]s.
//!
//! Channel payloads are untyped wire values; this crate is the seam
//! where they become (or fail to become) typed domain data. Decoding is
//! fail-closed: a missing record field, a wrong primitive type, or an
//! unrecognized enum variant is a [`CodecError`], never a silently
//! defaulted value.
//!
//! # Generated glue contract
//!
//! Code generators targeting platch channels emit impls of [`ToWire`]
//! and [`FromWire`] for each declared record, plus channel constants
//! shared verbatim by both sides. Generated code must:
//!
//! 1. encode arguments into the exact map shape its peer's `FromWire`
//!    impl expects (field-name text keys, recursive composition),
//! 2. use identical channel name strings on both sides, and
//! 3. surface every [`CodecError`] as a channel `Error` result — glue
//!    never panics on malformed input.
//!
//! The `tests/generated_glue.rs` suite is a conforming hand-written
//! rendition of such output.
//!
//! [`WireValue`]: platch_wire::WireValue

pub mod error;
pub mod json;
pub mod record;
pub mod shape;

pub use error::{CodecError, Result};
pub use json::{json_to_wire, wire_to_json};
pub use record::{decode_enum, FromWire, RecordBuilder, RecordReader, ToWire};
pub use shape::{FieldShape, Shape};
