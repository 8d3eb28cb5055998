//! Typed wire codec for server-action payloads.
//!
//! JSON alone cannot carry everything a server action may receive or
//! return, so rich values travel in a tagged envelope: `Date`, `RegExp`,
//! `Map`, `Set`, big integers and byte arrays survive the round trip,
//! and `undefined` and `NaN` stay distinct from `null`. Plain objects
//! pass untagged; an object that happens to contain the tag key is
//! escaped so application data can never collide with the envelope.

use base64::Engine;
use serde_json::{json, Map, Number, Value};

use crate::{TransformError, TransformResult};

const TAG: &str = "$peaque";

/// A value crossing the RPC boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Undefined,
    Bool(bool),
    /// Finite numbers, NaN and infinities.
    Number(f64),
    BigInt(String),
    String(String),
    /// Milliseconds since the epoch.
    Date(i64),
    RegExp { source: String, flags: String },
    Bytes(Vec<u8>),
    Array(Vec<WireValue>),
    /// Insertion-ordered `Map` entries.
    Map(Vec<(WireValue, WireValue)>),
    Set(Vec<WireValue>),
    Object(Vec<(String, WireValue)>),
}

impl WireValue {
    /// Build an object value from string keys.
    pub fn object(entries: impl IntoIterator<Item = (String, WireValue)>) -> Self {
        WireValue::Object(entries.into_iter().collect())
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        match self {
            WireValue::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

/// Encode a value to its JSON wire form.
pub fn encode(value: &WireValue) -> String {
    to_json(value).to_string()
}

/// Decode the JSON wire form.
pub fn decode(text: &str) -> TransformResult<WireValue> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| TransformError::Wire(format!("invalid wire payload: {e}")))?;
    from_json(&value)
}

/// Decode an RPC request body into its argument list.
pub fn decode_args(body: &[u8]) -> TransformResult<Vec<WireValue>> {
    let text = std::str::from_utf8(body)
        .map_err(|_| TransformError::Wire("request body is not utf-8".into()))?;
    let payload = decode(text)?;
    match payload.get("args") {
        Some(WireValue::Array(args)) => Ok(args.clone()),
        _ => Err(TransformError::Wire("payload is missing an `args` array".into())),
    }
}

fn tagged(kind: &str, value: Value) -> Value {
    json!({ TAG: kind, "v": value })
}

fn to_json(value: &WireValue) -> Value {
    match value {
        WireValue::Null => Value::Null,
        WireValue::Undefined => tagged("undefined", Value::Null),
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Number(n) => {
            if n.is_nan() {
                tagged("nan", Value::Null)
            } else if n.is_infinite() {
                tagged("inf", json!(if *n > 0.0 { 1 } else { -1 }))
            } else {
                Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        WireValue::BigInt(digits) => tagged("bigint", json!(digits)),
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Date(millis) => tagged("date", json!(millis)),
        WireValue::RegExp { source, flags } => {
            tagged("regexp", json!({ "source": source, "flags": flags }))
        }
        WireValue::Bytes(bytes) => {
            tagged("bytes", json!(base64::engine::general_purpose::STANDARD.encode(bytes)))
        }
        WireValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        WireValue::Map(entries) => tagged(
            "map",
            Value::Array(
                entries
                    .iter()
                    .map(|(k, v)| Value::Array(vec![to_json(k), to_json(v)]))
                    .collect(),
            ),
        ),
        WireValue::Set(items) => {
            tagged("set", Value::Array(items.iter().map(to_json).collect()))
        }
        WireValue::Object(entries) => {
            let collides = entries.iter().any(|(k, _)| k == TAG);
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), to_json(v));
            }
            if collides {
                tagged("object", Value::Object(map))
            } else {
                Value::Object(map)
            }
        }
    }
}

fn from_json(value: &Value) -> TransformResult<WireValue> {
    Ok(match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => WireValue::Number(
            n.as_f64().ok_or_else(|| TransformError::Wire("unrepresentable number".into()))?,
        ),
        Value::String(s) => WireValue::String(s.clone()),
        Value::Array(items) => {
            WireValue::Array(items.iter().map(from_json).collect::<TransformResult<_>>()?)
        }
        Value::Object(map) => match map.get(TAG).and_then(Value::as_str) {
            Some(kind) => from_tagged(kind, map)?,
            None => WireValue::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), from_json(v)?)))
                    .collect::<TransformResult<_>>()?,
            ),
        },
    })
}

fn from_tagged(kind: &str, map: &Map<String, Value>) -> TransformResult<WireValue> {
    let payload = map.get("v").unwrap_or(&Value::Null);
    let bad = |what: &str| TransformError::Wire(format!("malformed {what} wire value"));
    Ok(match kind {
        "undefined" => WireValue::Undefined,
        "nan" => WireValue::Number(f64::NAN),
        "inf" => {
            let sign = payload.as_i64().ok_or_else(|| bad("infinity"))?;
            WireValue::Number(if sign >= 0 { f64::INFINITY } else { f64::NEG_INFINITY })
        }
        "bigint" => WireValue::BigInt(payload.as_str().ok_or_else(|| bad("bigint"))?.to_string()),
        "date" => WireValue::Date(payload.as_i64().ok_or_else(|| bad("date"))?),
        "regexp" => {
            let source = payload
                .get("source")
                .and_then(Value::as_str)
                .ok_or_else(|| bad("regexp"))?;
            let flags = payload.get("flags").and_then(Value::as_str).unwrap_or("");
            WireValue::RegExp { source: source.to_string(), flags: flags.to_string() }
        }
        "bytes" => {
            let encoded = payload.as_str().ok_or_else(|| bad("bytes"))?;
            WireValue::Bytes(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|_| bad("bytes"))?,
            )
        }
        "map" => {
            let entries = payload.as_array().ok_or_else(|| bad("map"))?;
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| bad("map"))?;
                out.push((from_json(&pair[0])?, from_json(&pair[1])?));
            }
            WireValue::Map(out)
        }
        "set" => {
            let items = payload.as_array().ok_or_else(|| bad("set"))?;
            WireValue::Set(items.iter().map(from_json).collect::<TransformResult<_>>()?)
        }
        "object" => {
            let inner = payload.as_object().ok_or_else(|| bad("object"))?;
            WireValue::Object(
                inner
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), from_json(v)?)))
                    .collect::<TransformResult<_>>()?,
            )
        }
        other => return Err(TransformError::Wire(format!("unknown wire tag `{other}`"))),
    })
}

/// Convenience for handlers that only need JSON-safe data: lossy fold of
/// a wire value into plain JSON (rich types render to natural forms).
pub fn to_plain_json(value: &WireValue) -> Value {
    match value {
        WireValue::Null | WireValue::Undefined => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        WireValue::BigInt(d) => Value::String(d.clone()),
        WireValue::String(s) => Value::String(s.clone()),
        WireValue::Date(ms) => json!(ms),
        WireValue::RegExp { source, .. } => Value::String(source.clone()),
        WireValue::Bytes(b) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        WireValue::Array(items) | WireValue::Set(items) => {
            Value::Array(items.iter().map(to_plain_json).collect())
        }
        WireValue::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                if let WireValue::String(key) = k {
                    map.insert(key.clone(), to_plain_json(v));
                }
            }
            Value::Object(map)
        }
        WireValue::Object(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), to_plain_json(v));
            }
            Value::Object(map)
        }
    }
}

/// Build an args payload the way the generated client stub does; used by
/// the dispatcher tests.
pub fn encode_args(args: &[WireValue]) -> String {
    let payload = WireValue::object([(
        "args".to_string(),
        WireValue::Array(args.to_vec()),
    )]);
    encode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: WireValue) -> WireValue {
        decode(&encode(&value)).unwrap()
    }

    #[test]
    fn primitives_roundtrip() {
        assert_eq!(roundtrip(WireValue::Null), WireValue::Null);
        assert_eq!(roundtrip(WireValue::Bool(true)), WireValue::Bool(true));
        assert_eq!(roundtrip(WireValue::Number(2.5)), WireValue::Number(2.5));
        assert_eq!(
            roundtrip(WireValue::String("héllo".into())),
            WireValue::String("héllo".into())
        );
    }

    #[test]
    fn undefined_is_distinct_from_null() {
        assert_eq!(roundtrip(WireValue::Undefined), WireValue::Undefined);
        assert_ne!(encode(&WireValue::Undefined), encode(&WireValue::Null));
    }

    #[test]
    fn nan_and_infinities_roundtrip() {
        match roundtrip(WireValue::Number(f64::NAN)) {
            WireValue::Number(n) => assert!(n.is_nan()),
            other => panic!("expected number, got {other:?}"),
        }
        assert_eq!(roundtrip(WireValue::Number(f64::INFINITY)), WireValue::Number(f64::INFINITY));
        assert_eq!(
            roundtrip(WireValue::Number(f64::NEG_INFINITY)),
            WireValue::Number(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn rich_types_roundtrip() {
        assert_eq!(
            roundtrip(WireValue::Date(1_700_000_000_000)),
            WireValue::Date(1_700_000_000_000)
        );
        assert_eq!(
            roundtrip(WireValue::BigInt("900719925474099123".into())),
            WireValue::BigInt("900719925474099123".into())
        );
        let regexp = WireValue::RegExp { source: "^a+$".into(), flags: "gi".into() };
        assert_eq!(roundtrip(regexp.clone()), regexp);
        assert_eq!(
            roundtrip(WireValue::Bytes(vec![0, 1, 254, 255])),
            WireValue::Bytes(vec![0, 1, 254, 255])
        );
    }

    #[test]
    fn collections_preserve_order() {
        let map = WireValue::Map(vec![
            (WireValue::String("z".into()), WireValue::Number(1.0)),
            (WireValue::String("a".into()), WireValue::Number(2.0)),
            (WireValue::Number(3.0), WireValue::Bool(false)),
        ]);
        assert_eq!(roundtrip(map.clone()), map);

        let set = WireValue::Set(vec![WireValue::Number(3.0), WireValue::Number(1.0)]);
        assert_eq!(roundtrip(set.clone()), set);
    }

    #[test]
    fn nested_objects_roundtrip() {
        let value = WireValue::object([
            (
                "user".to_string(),
                WireValue::object([
                    ("name".to_string(), WireValue::String("Ada".into())),
                    ("joined".to_string(), WireValue::Date(86_400_000)),
                    ("nickname".to_string(), WireValue::Undefined),
                ]),
            ),
            (
                "tags".to_string(),
                WireValue::Array(vec![WireValue::String("admin".into())]),
            ),
        ]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn tag_key_collision_is_escaped() {
        let sneaky = WireValue::object([(TAG.to_string(), WireValue::String("date".into()))]);
        assert_eq!(roundtrip(sneaky.clone()), sneaky);
    }

    #[test]
    fn decode_args_extracts_argument_list() {
        let body = encode_args(&[WireValue::String("42".into()), WireValue::Bool(true)]);
        let args = decode_args(body.as_bytes()).unwrap();
        assert_eq!(args, vec![WireValue::String("42".into()), WireValue::Bool(true)]);
    }

    #[test]
    fn decode_args_rejects_missing_args() {
        assert!(decode_args(b"{}").is_err());
        assert!(decode_args(b"not json").is_err());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(decode("{\"$peaque\":\"mystery\",\"v\":null}").is_err());
    }

    #[test]
    fn plain_json_folding() {
        let value = WireValue::object([
            ("n".to_string(), WireValue::Number(1.0)),
            ("u".to_string(), WireValue::Undefined),
        ]);
        assert_eq!(to_plain_json(&value), serde_json::json!({ "n": 1.0, "u": null }));
    }
}
