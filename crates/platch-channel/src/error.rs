use std::time::Duration;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Wire-level framing or value codec error.
    #[error("wire error: {0}")]
    Wire(#[from] platch_wire::WireError),

    /// A channel name is already taken by a different kind or handler.
    ///
    /// Re-registering the identical handler is idempotent and does not
    /// produce this error.
    #[error("channel '{name}' already registered with a different kind or handler")]
    DuplicateChannel { name: String },

    /// No handler is registered under this name.
    #[error("no handler registered for channel '{name}'")]
    UnknownChannel { name: String },

    /// The channel tore down before the pending invocation resolved.
    #[error("invocation on channel '{name}' abandoned (channel torn down)")]
    Abandoned { name: String },

    /// The invocation did not resolve within the requested deadline.
    #[error("invocation on channel '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The handler rejected a stream subscription.
    #[error("listen on channel '{name}' rejected: {code}: {message}")]
    ListenRejected {
        name: String,
        code: String,
        message: String,
    },

    /// The host is shut down or the peer went away.
    #[error("host disconnected: {0}")]
    Disconnected(String),

    /// The peer sent an envelope this runtime cannot interpret.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
