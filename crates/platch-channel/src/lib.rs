//! Typed bidirectional message channels over one shared transport.
//!
//! A [`Host`] wraps one ordered, reliable byte stream and multiplexes
//! two messaging styles over named channels:
//!
//! - **Method channels** — request/response: one side invokes a named
//!   method with wire-value arguments and blocks for exactly one
//!   [`MethodResult`] (success, a declared error, or not-implemented)
//! - **Event channels** — server push: a listener subscribes and the
//!   handler emits values through an [`EventSink`] until the listener
//!   cancels or the producer finishes; at most one active listener per
//!   channel
//!
//! Both sides of a connection are symmetric: either may register
//! handlers and either may invoke, so reverse invocations (a handler
//! pushing an unsolicited call back to its peer) are ordinary calls.
//!
//! The transport is any `Read + Write` pair; [`pipe::duplex`] provides
//! an in-memory one for tests and demos.

pub mod envelope;
pub mod error;
pub mod event;
pub mod host;
pub mod message;
pub mod method;
pub mod pipe;
pub mod registry;
pub mod scheduler;
mod sync;

pub use envelope::Envelope;
pub use error::{ChannelError, Result};
pub use event::{EventChannel, EventError, EventSink, EventStream, StreamEvent, StreamHandler};
pub use host::Host;
pub use message::{MethodCall, MethodResult};
pub use method::{MethodChannel, MethodHandler};
pub use registry::{ChannelKind, ChannelRegistry, Handler};
pub use scheduler::{schedule, CancelToken};
