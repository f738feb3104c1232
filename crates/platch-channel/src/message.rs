use platch_codec::CodecError;
use platch_wire::WireValue;

/// One method invocation: a method name plus wire-value arguments.
///
/// Immutable once constructed; one per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: WireValue,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: WireValue) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// The single outcome of a method invocation.
///
/// Exactly one result is produced per call. `NotImplemented` is the
/// normal answer for an unrecognized method name, not a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(WireValue),
    Error {
        code: String,
        message: String,
        details: WireValue,
    },
    NotImplemented,
}

impl MethodResult {
    pub fn success(value: impl Into<WireValue>) -> Self {
        MethodResult::Success(value.into())
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, details: WireValue) -> Self {
        MethodResult::Error {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success(_))
    }
}

// Generated glue surfaces decode failures as declared errors, never as
// an unwound handler.
impl From<CodecError> for MethodResult {
    fn from(err: CodecError) -> Self {
        MethodResult::error("decode-error", err.to_string(), WireValue::Null)
    }
}
