use platch_wire::WireValue;

use crate::error::{CodecError, Result};

/// Structural description of the wire value a decoder expects.
///
/// `check` validates a value against the shape before (or instead of)
/// typed decoding, failing closed on any mismatch. Record checks name
/// the first missing field; extra map entries are tolerated.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Any wire value.
    Any,
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// Null or the inner shape.
    Optional(Box<Shape>),
    /// A list whose elements all match the inner shape.
    List(Box<Shape>),
    /// A map whose keys and values match the given shapes.
    Map(Box<Shape>, Box<Shape>),
    /// A record: a map from field-name text to field values.
    Record(Vec<FieldShape>),
    /// An enum encoded as its canonical text name.
    Enum {
        name: &'static str,
        variants: Vec<&'static str>,
    },
}

/// One field of a record shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: String,
    pub shape: Shape,
    pub required: bool,
}

impl Shape {
    pub fn optional(inner: Shape) -> Self {
        Shape::Optional(Box::new(inner))
    }

    pub fn list(element: Shape) -> Self {
        Shape::List(Box::new(element))
    }

    pub fn map(key: Shape, value: Shape) -> Self {
        Shape::Map(Box::new(key), Box::new(value))
    }

    pub fn record(fields: impl IntoIterator<Item = (&'static str, Shape)>) -> Self {
        Shape::Record(
            fields
                .into_iter()
                .map(|(name, shape)| FieldShape {
                    name: name.to_string(),
                    shape,
                    required: true,
                })
                .collect(),
        )
    }

    /// Validate a wire value against this shape.
    pub fn check(&self, value: &WireValue) -> Result<()> {
        match (self, value) {
            (Shape::Any, _) => Ok(()),
            (Shape::Null, WireValue::Null) => Ok(()),
            (Shape::Bool, WireValue::Bool(_)) => Ok(()),
            (Shape::Int, WireValue::Int(_)) => Ok(()),
            (Shape::Float, WireValue::Float(_)) => Ok(()),
            (Shape::Text, WireValue::Text(_)) => Ok(()),
            (Shape::Bytes, WireValue::Bytes(_)) => Ok(()),
            (Shape::Optional(_), WireValue::Null) => Ok(()),
            (Shape::Optional(inner), other) => inner.check(other),
            (Shape::List(element), WireValue::List(items)) => {
                items.iter().try_for_each(|item| element.check(item))
            }
            (Shape::Map(key, val), WireValue::Map(entries)) => {
                entries.iter().try_for_each(|(k, v)| {
                    key.check(k)?;
                    val.check(v)
                })
            }
            (Shape::Record(fields), WireValue::Map(_)) => {
                for field in fields {
                    match value.get(&field.name) {
                        Some(found) => field.shape.check(found)?,
                        None if field.required => {
                            return Err(CodecError::MissingField {
                                field: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            (Shape::Enum { name, variants }, WireValue::Text(text)) => {
                if variants.contains(&text.as_str()) {
                    Ok(())
                } else {
                    Err(CodecError::UnknownVariant {
                        value: text.clone(),
                        expected: name,
                    })
                }
            }
            (shape, found) => Err(CodecError::UnexpectedType {
                expected: shape.expected_name(),
                found: found.type_name(),
            }),
        }
    }

    fn expected_name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::Null => "null",
            Shape::Bool => "bool",
            Shape::Int => "int",
            Shape::Float => "float",
            Shape::Text => "text",
            Shape::Bytes => "bytes",
            Shape::Optional(_) => "optional value",
            Shape::List(_) => "list",
            Shape::Map(_, _) => "map",
            Shape::Record(_) => "map",
            Shape::Enum { name, .. } => name,
        }
    }
}
