//! Correlation envelope carried in every frame payload.
//!
//! The payload of a frame is one encoded [`WireValue`]: a list whose
//! first element tags the envelope kind. Method invocations and their
//! replies correlate through an id assigned by the calling side; each
//! direction assigns ids independently, so nested reverse invocations
//! never collide.
//!
//! Layout:
//! - Call:   `[0, id, method, arguments]`
//! - Reply:  `[1, id, result]` with result `[0, value]`,
//!   `[1, code, message, details]` or `[2]`
//! - Listen: `[2, id, arguments]` (acked with a Reply)
//! - Cancel: `[3, id]` (acked with a Reply)
//! - Event:  `[4, id, 0, value]`, `[4, id, 1, code, message, details]`
//!   or `[4, id, 2]`
//!
//! An event carries the id of the Listen that opened its subscription.
//! When a new listen replaces an old one, stragglers the old producer
//! already put on the wire still carry the old id, and the listening
//! side uses that to keep them out of the new stream.

use bytes::Bytes;
use platch_wire::{decode_value, value_to_bytes, WireValue};

use crate::error::{ChannelError, Result};
use crate::event::StreamEvent;
use crate::message::{MethodCall, MethodResult};

const TAG_CALL: i64 = 0;
const TAG_REPLY: i64 = 1;
const TAG_LISTEN: i64 = 2;
const TAG_CANCEL: i64 = 3;
const TAG_EVENT: i64 = 4;

const RESULT_SUCCESS: i64 = 0;
const RESULT_ERROR: i64 = 1;
const RESULT_NOT_IMPLEMENTED: i64 = 2;

const EVENT_DATA: i64 = 0;
const EVENT_ERROR: i64 = 1;
const EVENT_DONE: i64 = 2;

/// One decoded frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Call { id: i64, call: MethodCall },
    Reply { id: i64, result: MethodResult },
    Listen { id: i64, arguments: WireValue },
    Cancel { id: i64 },
    Event { id: i64, event: StreamEvent },
}

impl Envelope {
    pub fn to_wire(&self) -> WireValue {
        match self {
            Envelope::Call { id, call } => WireValue::List(vec![
                WireValue::Int(TAG_CALL),
                WireValue::Int(*id),
                WireValue::Text(call.method.clone()),
                call.arguments.clone(),
            ]),
            Envelope::Reply { id, result } => WireValue::List(vec![
                WireValue::Int(TAG_REPLY),
                WireValue::Int(*id),
                encode_result(result),
            ]),
            Envelope::Listen { id, arguments } => WireValue::List(vec![
                WireValue::Int(TAG_LISTEN),
                WireValue::Int(*id),
                arguments.clone(),
            ]),
            Envelope::Cancel { id } => {
                WireValue::List(vec![WireValue::Int(TAG_CANCEL), WireValue::Int(*id)])
            }
            Envelope::Event { id, event } => {
                let mut items = vec![WireValue::Int(TAG_EVENT), WireValue::Int(*id)];
                match event {
                    StreamEvent::Data(value) => {
                        items.push(WireValue::Int(EVENT_DATA));
                        items.push(value.clone());
                    }
                    StreamEvent::Error {
                        code,
                        message,
                        details,
                    } => {
                        items.push(WireValue::Int(EVENT_ERROR));
                        items.push(WireValue::Text(code.clone()));
                        items.push(WireValue::Text(message.clone()));
                        items.push(details.clone());
                    }
                    StreamEvent::Done => items.push(WireValue::Int(EVENT_DONE)),
                }
                WireValue::List(items)
            }
        }
    }

    pub fn from_wire(value: &WireValue) -> Result<Self> {
        let items = value
            .as_list()
            .ok_or_else(|| malformed("envelope is not a list"))?;
        let tag = tag_of(items, "envelope")?;

        match tag {
            TAG_CALL => {
                let id = int_at(items, 1, "call id")?;
                let method = text_at(items, 2, "call method")?;
                let arguments = item_at(items, 3, "call arguments")?.clone();
                Ok(Envelope::Call {
                    id,
                    call: MethodCall::new(method, arguments),
                })
            }
            TAG_REPLY => {
                let id = int_at(items, 1, "reply id")?;
                let result = decode_result(item_at(items, 2, "reply result")?)?;
                Ok(Envelope::Reply { id, result })
            }
            TAG_LISTEN => {
                let id = int_at(items, 1, "listen id")?;
                let arguments = item_at(items, 2, "listen arguments")?.clone();
                Ok(Envelope::Listen { id, arguments })
            }
            TAG_CANCEL => {
                let id = int_at(items, 1, "cancel id")?;
                Ok(Envelope::Cancel { id })
            }
            TAG_EVENT => {
                let id = int_at(items, 1, "event id")?;
                let kind = int_at(items, 2, "event kind")?;
                let event = match kind {
                    EVENT_DATA => StreamEvent::Data(item_at(items, 3, "event value")?.clone()),
                    EVENT_ERROR => StreamEvent::Error {
                        code: text_at(items, 3, "event error code")?,
                        message: text_at(items, 4, "event error message")?,
                        details: item_at(items, 5, "event error details")?.clone(),
                    },
                    EVENT_DONE => StreamEvent::Done,
                    other => return Err(malformed(&format!("unknown event kind {other}"))),
                };
                Ok(Envelope::Event { id, event })
            }
            other => Err(malformed(&format!("unknown envelope tag {other}"))),
        }
    }

    /// Encode this envelope into a frame payload.
    pub fn encode(&self) -> Bytes {
        value_to_bytes(&self.to_wire())
    }

    /// Decode a frame payload into an envelope.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(payload);
        let value = decode_value(&mut buf)?;
        Self::from_wire(&value)
    }
}

fn encode_result(result: &MethodResult) -> WireValue {
    match result {
        MethodResult::Success(value) => {
            WireValue::List(vec![WireValue::Int(RESULT_SUCCESS), value.clone()])
        }
        MethodResult::Error {
            code,
            message,
            details,
        } => WireValue::List(vec![
            WireValue::Int(RESULT_ERROR),
            WireValue::Text(code.clone()),
            WireValue::Text(message.clone()),
            details.clone(),
        ]),
        MethodResult::NotImplemented => {
            WireValue::List(vec![WireValue::Int(RESULT_NOT_IMPLEMENTED)])
        }
    }
}

fn decode_result(value: &WireValue) -> Result<MethodResult> {
    let items = value
        .as_list()
        .ok_or_else(|| malformed("result is not a list"))?;
    match tag_of(items, "result")? {
        RESULT_SUCCESS => Ok(MethodResult::Success(
            item_at(items, 1, "success value")?.clone(),
        )),
        RESULT_ERROR => Ok(MethodResult::Error {
            code: text_at(items, 1, "error code")?,
            message: text_at(items, 2, "error message")?,
            details: item_at(items, 3, "error details")?.clone(),
        }),
        RESULT_NOT_IMPLEMENTED => Ok(MethodResult::NotImplemented),
        other => Err(malformed(&format!("unknown result tag {other}"))),
    }
}

fn tag_of(items: &[WireValue], what: &str) -> Result<i64> {
    int_at(items, 0, what)
}

fn item_at<'a>(items: &'a [WireValue], index: usize, what: &str) -> Result<&'a WireValue> {
    items
        .get(index)
        .ok_or_else(|| malformed(&format!("missing {what}")))
}

fn int_at(items: &[WireValue], index: usize, what: &str) -> Result<i64> {
    item_at(items, index, what)?
        .as_i64()
        .ok_or_else(|| malformed(&format!("{what} is not an integer")))
}

fn text_at(items: &[WireValue], index: usize, what: &str) -> Result<String> {
    item_at(items, index, what)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(&format!("{what} is not text")))
}

fn malformed(detail: &str) -> ChannelError {
    ChannelError::Protocol(detail.to_string())
}
