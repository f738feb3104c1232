/// Errors raised while converting between wire values and domain data.
///
/// These are local to the decode call; the channel layer surfaces them
/// as error results, never as a crashed channel.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A required record field is absent from the wire map.
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// A value had a different wire type than the shape expects.
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// A text value did not name any variant of the expected enum.
    #[error("'{value}' is not a variant of {expected}")]
    UnknownVariant {
        value: String,
        expected: &'static str,
    },

    /// An integer does not fit the target domain type.
    #[error("integer {value} out of range for {target}")]
    IntOutOfRange { value: i64, target: &'static str },

    /// A map key cannot be represented in the target format.
    #[error("map key of type {found} cannot be represented as text")]
    NonTextKey { found: &'static str },
}

pub type Result<T> = std::result::Result<T, CodecError>;
