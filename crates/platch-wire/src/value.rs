use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Maximum nesting depth accepted when decoding values.
pub const MAX_VALUE_DEPTH: usize = 64;

const TAG_NULL: u8 = 0;
const TAG_TRUE: u8 = 1;
const TAG_FALSE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_TEXT: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;

/// Generic tagged-union representation for values crossing a channel
/// boundary.
///
/// Map entries preserve insertion order and keys may themselves be
/// composite values.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Float(f) => Some(*f),
            WireValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(WireValue, WireValue)]> {
        match self {
            WireValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by arbitrary key.
    pub fn entry(&self, key: &WireValue) -> Option<&WireValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a map entry by text key.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Short lowercase name of this value's variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::Int(_) => "int",
            WireValue::Float(_) => "float",
            WireValue::Text(_) => "text",
            WireValue::Bytes(_) => "bytes",
            WireValue::List(_) => "list",
            WireValue::Map(_) => "map",
        }
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

impl From<i64> for WireValue {
    fn from(n: i64) -> Self {
        WireValue::Int(n)
    }
}

impl From<i32> for WireValue {
    fn from(n: i32) -> Self {
        WireValue::Int(n.into())
    }
}

impl From<f64> for WireValue {
    fn from(f: f64) -> Self {
        WireValue::Float(f)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::Text(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::Text(s)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(b: Vec<u8>) -> Self {
        WireValue::Bytes(b)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(items: Vec<WireValue>) -> Self {
        WireValue::List(items)
    }
}

/// Encode a value into the binary wire form.
///
/// Layout: one tag byte, then a payload. Integers and floats are
/// little-endian; text/bytes/list/map carry a u32 LE length or count.
/// Tags: 0 null, 1 true, 2 false, 3 i64, 4 f64, 5 text, 6 bytes,
/// 7 list, 8 map.
pub fn encode_value(value: &WireValue, dst: &mut BytesMut) {
    match value {
        WireValue::Null => dst.put_u8(TAG_NULL),
        WireValue::Bool(true) => dst.put_u8(TAG_TRUE),
        WireValue::Bool(false) => dst.put_u8(TAG_FALSE),
        WireValue::Int(n) => {
            dst.put_u8(TAG_INT);
            dst.put_i64_le(*n);
        }
        WireValue::Float(f) => {
            dst.put_u8(TAG_FLOAT);
            dst.put_f64_le(*f);
        }
        WireValue::Text(s) => {
            dst.put_u8(TAG_TEXT);
            dst.put_u32_le(s.len() as u32);
            dst.put_slice(s.as_bytes());
        }
        WireValue::Bytes(b) => {
            dst.put_u8(TAG_BYTES);
            dst.put_u32_le(b.len() as u32);
            dst.put_slice(b);
        }
        WireValue::List(items) => {
            dst.put_u8(TAG_LIST);
            dst.put_u32_le(items.len() as u32);
            for item in items {
                encode_value(item, dst);
            }
        }
        WireValue::Map(entries) => {
            dst.put_u8(TAG_MAP);
            dst.put_u32_le(entries.len() as u32);
            for (key, val) in entries {
                encode_value(key, dst);
                encode_value(val, dst);
            }
        }
    }
}

/// Encode a value into a fresh buffer.
pub fn value_to_bytes(value: &WireValue) -> bytes::Bytes {
    let mut buf = BytesMut::new();
    encode_value(value, &mut buf);
    buf.freeze()
}

/// Decode one value from a buffer, consuming its bytes.
///
/// Unlike frame decoding this operates on a complete payload, so a
/// short buffer is an error, not a retry condition.
pub fn decode_value(src: &mut impl Buf) -> Result<WireValue> {
    decode_value_at(src, 0)
}

fn decode_value_at(src: &mut impl Buf, depth: usize) -> Result<WireValue> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(WireError::DepthExceeded {
            max: MAX_VALUE_DEPTH,
        });
    }

    if src.remaining() < 1 {
        return Err(WireError::Truncated { needed: 1 });
    }

    match src.get_u8() {
        TAG_NULL => Ok(WireValue::Null),
        TAG_TRUE => Ok(WireValue::Bool(true)),
        TAG_FALSE => Ok(WireValue::Bool(false)),
        TAG_INT => {
            need(src, 8)?;
            Ok(WireValue::Int(src.get_i64_le()))
        }
        TAG_FLOAT => {
            need(src, 8)?;
            Ok(WireValue::Float(src.get_f64_le()))
        }
        TAG_TEXT => {
            let len = get_len(src)?;
            need(src, len)?;
            let mut raw = vec![0u8; len];
            src.copy_to_slice(&mut raw);
            let text = String::from_utf8(raw).map_err(|_| WireError::TextUtf8)?;
            Ok(WireValue::Text(text))
        }
        TAG_BYTES => {
            let len = get_len(src)?;
            need(src, len)?;
            let mut raw = vec![0u8; len];
            src.copy_to_slice(&mut raw);
            Ok(WireValue::Bytes(raw))
        }
        TAG_LIST => {
            let count = get_len(src)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_value_at(src, depth + 1)?);
            }
            Ok(WireValue::List(items))
        }
        TAG_MAP => {
            let count = get_len(src)?;
            let mut entries = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let key = decode_value_at(src, depth + 1)?;
                let val = decode_value_at(src, depth + 1)?;
                entries.push((key, val));
            }
            Ok(WireValue::Map(entries))
        }
        tag => Err(WireError::UnknownTag(tag)),
    }
}

fn get_len(src: &mut impl Buf) -> Result<usize> {
    need(src, 4)?;
    Ok(src.get_u32_le() as usize)
}

fn need(src: &impl Buf, n: usize) -> Result<()> {
    if src.remaining() < n {
        return Err(WireError::Truncated {
            needed: n - src.remaining(),
        });
    }
    Ok(())
}
