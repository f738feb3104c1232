/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5043 \"PC\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel name is empty or exceeds the maximum length.
    #[error("invalid channel name length: {len} (max {max})")]
    InvalidChannelName { len: usize, max: usize },

    /// The channel name is not valid UTF-8.
    #[error("channel name is not valid UTF-8")]
    ChannelNameUtf8,

    /// A value ended before its declared length.
    #[error("truncated value (needed {needed} more bytes)")]
    Truncated { needed: usize },

    /// An unknown value tag was encountered.
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),

    /// Text payload is not valid UTF-8.
    #[error("text value is not valid UTF-8")]
    TextUtf8,

    /// A value nests deeper than the supported maximum.
    #[error("value nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
