use platch_wire::WireValue;

use crate::error::{CodecError, Result};

/// Conversion of a domain value into its wire representation.
///
/// Records encode as a map from field-name text to the field's encoded
/// value; nested records and sequences compose recursively.
pub trait ToWire {
    fn to_wire(&self) -> WireValue;
}

/// Fail-closed conversion of a wire value back into a domain value.
pub trait FromWire: Sized {
    fn from_wire(value: &WireValue) -> Result<Self>;
}

impl ToWire for WireValue {
    fn to_wire(&self) -> WireValue {
        self.clone()
    }
}

impl FromWire for WireValue {
    fn from_wire(value: &WireValue) -> Result<Self> {
        Ok(value.clone())
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> WireValue {
        WireValue::Bool(*self)
    }
}

impl FromWire for bool {
    fn from_wire(value: &WireValue) -> Result<Self> {
        value.as_bool().ok_or_else(|| unexpected("bool", value))
    }
}

impl ToWire for i64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Int(*self)
    }
}

impl FromWire for i64 {
    fn from_wire(value: &WireValue) -> Result<Self> {
        value.as_i64().ok_or_else(|| unexpected("int", value))
    }
}

impl ToWire for i32 {
    fn to_wire(&self) -> WireValue {
        WireValue::Int((*self).into())
    }
}

impl FromWire for i32 {
    fn from_wire(value: &WireValue) -> Result<Self> {
        let n = i64::from_wire(value)?;
        i32::try_from(n).map_err(|_| CodecError::IntOutOfRange {
            value: n,
            target: "i32",
        })
    }
}

impl ToWire for f64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Float(*self)
    }
}

impl FromWire for f64 {
    fn from_wire(value: &WireValue) -> Result<Self> {
        value.as_f64().ok_or_else(|| unexpected("float", value))
    }
}

impl ToWire for String {
    fn to_wire(&self) -> WireValue {
        WireValue::Text(self.clone())
    }
}

impl FromWire for String {
    fn from_wire(value: &WireValue) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected("text", value))
    }
}

impl ToWire for &str {
    fn to_wire(&self) -> WireValue {
        WireValue::Text((*self).to_string())
    }
}

impl<T: ToWire> ToWire for Option<T> {
    fn to_wire(&self) -> WireValue {
        match self {
            Some(inner) => inner.to_wire(),
            None => WireValue::Null,
        }
    }
}

impl<T: FromWire> FromWire for Option<T> {
    fn from_wire(value: &WireValue) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_wire(value).map(Some)
    }
}

impl<T: ToWire> ToWire for Vec<T> {
    fn to_wire(&self) -> WireValue {
        WireValue::List(self.iter().map(ToWire::to_wire).collect())
    }
}

impl<T: FromWire> FromWire for Vec<T> {
    fn from_wire(value: &WireValue) -> Result<Self> {
        let items = value.as_list().ok_or_else(|| unexpected("list", value))?;
        items.iter().map(T::from_wire).collect()
    }
}

fn unexpected(expected: &'static str, found: &WireValue) -> CodecError {
    CodecError::UnexpectedType {
        expected,
        found: found.type_name(),
    }
}

/// Builds the wire map for one record, field by field.
#[derive(Default)]
pub struct RecordBuilder {
    entries: Vec<(WireValue, WireValue)>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T: ToWire + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.entries
            .push((WireValue::Text(name.to_string()), value.to_wire()));
        self
    }

    pub fn build(self) -> WireValue {
        WireValue::Map(self.entries)
    }
}

/// Reads typed fields out of a record's wire map.
///
/// Absent required fields are an error naming the field; absent or null
/// optional fields decode to `None`. Unknown extra entries are ignored,
/// which keeps old decoders compatible with newer encoders.
#[derive(Debug)]
pub struct RecordReader<'a> {
    entries: &'a [(WireValue, WireValue)],
}

impl<'a> RecordReader<'a> {
    pub fn new(value: &'a WireValue) -> Result<Self> {
        let entries = value.as_map().ok_or_else(|| unexpected("map", value))?;
        Ok(Self { entries })
    }

    /// Decode a required field.
    pub fn field<T: FromWire>(&self, name: &str) -> Result<T> {
        let value = self.raw(name).ok_or_else(|| CodecError::MissingField {
            field: name.to_string(),
        })?;
        T::from_wire(value)
    }

    /// Decode an optional field; absent and null both decode to `None`.
    pub fn optional<T: FromWire>(&self, name: &str) -> Result<Option<T>> {
        match self.raw(name) {
            None => Ok(None),
            Some(value) => Option::<T>::from_wire(value),
        }
    }

    /// Borrow a field's raw wire value, if present.
    pub fn raw(&self, name: &str) -> Option<&'a WireValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }
}

/// Decode an enum encoded as its canonical text name.
///
/// Decoding is by exact name match; anything else is
/// [`CodecError::UnknownVariant`].
pub fn decode_enum<T: Copy>(
    value: &WireValue,
    enum_name: &'static str,
    variants: &[(&'static str, T)],
) -> Result<T> {
    let text = value.as_str().ok_or_else(|| unexpected("text", value))?;
    variants
        .iter()
        .find(|(name, _)| *name == text)
        .map(|(_, variant)| *variant)
        .ok_or_else(|| CodecError::UnknownVariant {
            value: text.to_string(),
            expected: enum_name,
        })
}
