use std::fmt;
use std::io;

use platch_channel::ChannelError;
use platch_wire::WireError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// The remote handler answered with a declared error result.
pub const REMOTE_ERROR: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        WireError::PayloadTooLarge { .. }
        | WireError::InvalidChannelName { .. }
        | WireError::UnknownTag(_)
        | WireError::TextUtf8
        | WireError::ChannelNameUtf8
        | WireError::DepthExceeded { .. }
        | WireError::Truncated { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        WireError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Wire(err) => wire_error(context, err),
        ChannelError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::UnknownChannel { .. } | ChannelError::DuplicateChannel { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ChannelError::ListenRejected { .. } => {
            CliError::new(REMOTE_ERROR, format!("{context}: {err}"))
        }
        ChannelError::Abandoned { .. } | ChannelError::Disconnected(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ChannelError::Protocol(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}
