//! JSON interop for tooling.
//!
//! The CLI speaks JSON at its edges; channels speak binary wire values.
//! These conversions are lossy only where JSON itself cannot represent
//! the wire model (composite map keys, raw bytes).

use platch_wire::WireValue;

use crate::error::{CodecError, Result};

/// Convert a JSON value into its closest wire representation.
///
/// Integer-valued JSON numbers become `Int`, everything else `Float`.
pub fn json_to_wire(value: &serde_json::Value) -> WireValue {
    match value {
        serde_json::Value::Null => WireValue::Null,
        serde_json::Value::Bool(b) => WireValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                WireValue::Int(i)
            } else {
                WireValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => WireValue::Text(s.clone()),
        serde_json::Value::Array(items) => {
            WireValue::List(items.iter().map(json_to_wire).collect())
        }
        serde_json::Value::Object(entries) => WireValue::Map(
            entries
                .iter()
                .map(|(k, v)| (WireValue::Text(k.clone()), json_to_wire(v)))
                .collect(),
        ),
    }
}

/// Convert a wire value into JSON.
///
/// Bytes render as an array of numbers; map keys must be text.
pub fn wire_to_json(value: &WireValue) -> Result<serde_json::Value> {
    Ok(match value {
        WireValue::Null => serde_json::Value::Null,
        WireValue::Bool(b) => serde_json::Value::Bool(*b),
        WireValue::Int(n) => serde_json::Value::Number((*n).into()),
        WireValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        WireValue::Text(s) => serde_json::Value::String(s.clone()),
        WireValue::Bytes(b) => serde_json::Value::Array(
            b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
        ),
        WireValue::List(items) => {
            serde_json::Value::Array(items.iter().map(wire_to_json).collect::<Result<_>>()?)
        }
        WireValue::Map(entries) => {
            let mut object = serde_json::Map::with_capacity(entries.len());
            for (key, val) in entries {
                let key = key.as_str().ok_or(CodecError::NonTextKey {
                    found: key.type_name(),
                })?;
                object.insert(key.to_string(), wire_to_json(val)?);
            }
            serde_json::Value::Object(object)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_roundtrips_through_wire() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"name":"dev","cores":4,"ratio":0.5,"tags":["a","b"],"extra":null}"#,
        )
        .unwrap();
        let wire = json_to_wire(&json);
        assert_eq!(wire.get("cores"), Some(&WireValue::Int(4)));
        assert_eq!(wire.get("ratio"), Some(&WireValue::Float(0.5)));
        assert_eq!(wire_to_json(&wire).unwrap(), json);
    }

    #[test]
    fn composite_map_key_rejected_in_json() {
        let wire = WireValue::Map(vec![(
            WireValue::List(vec![WireValue::Int(1)]),
            WireValue::Null,
        )]);
        assert!(matches!(
            wire_to_json(&wire),
            Err(CodecError::NonTextKey { found: "list" })
        ));
    }

    #[test]
    fn bytes_render_as_number_array() {
        let json = wire_to_json(&WireValue::Bytes(vec![1, 2, 255])).unwrap();
        assert_eq!(json, serde_json::json!([1, 2, 255]));
    }
}
