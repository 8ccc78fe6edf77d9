//! JSON projections of typed and native values.

use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value as Json};

use crate::error::{ValueError, ValueResult};
use crate::native::NativeValue;
use crate::typed::{TypedMap, TypedValue};

/// Typed values serialize to plain JSON. Big integers become strings,
/// non-finite floats become `null`, and functions, errors and signals
/// become `{"$type": ...}` placeholder objects.
impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Self::Float(_) => serializer.serialize_unit(),
            Self::BigInt(n) => serializer.serialize_str(&n.to_string()),
            Self::String(s) => serializer.serialize_str(s),
            Self::DateTime(d) => serializer.serialize_str(&d.to_rfc3339()),
            Self::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for byte in bytes.iter() {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Self::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list.items() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, &value)?;
                }
                out.end()
            }
            Self::Function(func) => {
                let mut out = serializer.serialize_map(Some(2))?;
                out.serialize_entry("$type", "function")?;
                out.serialize_entry("name", func.name())?;
                out.end()
            }
            Self::Error(err) => {
                let mut out = serializer.serialize_map(Some(4))?;
                out.serialize_entry("$type", "error")?;
                out.serialize_entry("kind", &err.kind)?;
                out.serialize_entry("message", &err.message)?;
                out.serialize_entry("data", &err.payload)?;
                out.end()
            }
            Self::Signal(kind) => {
                let mut out = serializer.serialize_map(Some(2))?;
                out.serialize_entry("$type", "signal")?;
                out.serialize_entry("kind", kind)?;
                out.end()
            }
        }
    }
}

/// The JSON projection of a typed value.
pub fn to_json(value: &TypedValue) -> Json {
    serde_json::to_value(value).unwrap_or(Json::Null)
}

/// Build a typed value from JSON. Objects become mappings; integral
/// numbers become integers.
pub fn from_json(json: &Json) -> TypedValue {
    match json {
        Json::Null => TypedValue::Null,
        Json::Bool(b) => TypedValue::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => TypedValue::Integer(i),
            None => n.as_f64().map_or(TypedValue::Null, TypedValue::Float),
        },
        Json::String(s) => TypedValue::string(s),
        Json::Array(items) => TypedValue::list(items.iter().map(from_json).collect()),
        Json::Object(entries) => TypedValue::mapping(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), from_json(value)))
                .collect::<TypedMap>(),
        ),
    }
}

/// `JSON.stringify` semantics: `None` for values JSON cannot express at
/// the top level (undefined, functions). Cycles are an error.
pub fn native_to_json(value: &NativeValue) -> ValueResult<Option<Json>> {
    native_to_json_inner(value, &mut Vec::new())
}

fn native_to_json_inner(value: &NativeValue, stack: &mut Vec<*const ()>) -> ValueResult<Option<Json>> {
    Ok(Some(match value {
        NativeValue::Undefined | NativeValue::Function(_) | NativeValue::Opaque(_) => return Ok(None),
        NativeValue::Null => Json::Null,
        NativeValue::Bool(b) => Json::Bool(*b),
        NativeValue::Number(n) => Number::from_f64(*n).map_or(Json::Null, |num| {
            // Integral doubles print without a fraction
            if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                Json::from(*n as i64)
            } else {
                Json::Number(num)
            }
        }),
        NativeValue::BigInt(_) => {
            return Err(ValueError::runtime("Do not know how to serialize a BigInt"))
        }
        NativeValue::String(s) => Json::String(s.to_string()),
        NativeValue::Date(d) => Json::String(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        NativeValue::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        NativeValue::Array(items) => {
            let identity = Rc::as_ptr(items) as *const ();
            if stack.contains(&identity) {
                return Err(ValueError::runtime("Converting circular structure to JSON"));
            }
            stack.push(identity);
            let mut out = Vec::new();
            for item in items.borrow().iter() {
                // Unrepresentable array elements become null
                out.push(native_to_json_inner(item, stack)?.unwrap_or(Json::Null));
            }
            stack.pop();
            Json::Array(out)
        }
        NativeValue::Object(entries) => {
            let identity = Rc::as_ptr(entries) as *const ();
            if stack.contains(&identity) {
                return Err(ValueError::runtime("Converting circular structure to JSON"));
            }
            stack.push(identity);
            let mut out = Map::new();
            for (key, item) in entries.borrow().iter() {
                // Unrepresentable properties are omitted
                if let Some(json) = native_to_json_inner(item, stack)? {
                    out.insert(key.clone(), json);
                }
            }
            stack.pop();
            Json::Object(out)
        }
    }))
}

/// `JSON.parse` semantics.
pub fn native_from_json(json: &Json) -> NativeValue {
    match json {
        Json::Null => NativeValue::Null,
        Json::Bool(b) => NativeValue::Bool(*b),
        Json::Number(n) => NativeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => NativeValue::string(s),
        Json::Array(items) => NativeValue::array(items.iter().map(native_from_json).collect()),
        Json::Object(entries) => NativeValue::object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), native_from_json(value))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::FunctionValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_typed_projection() {
        let mut map = TypedMap::new();
        map.insert("Name", TypedValue::from("box"));
        map.insert("ratio", TypedValue::Float(f64::NAN));
        map.insert(
            "f",
            TypedValue::Function(FunctionValue::from_fn("f", |_| Ok(TypedValue::Null))),
        );
        assert_eq!(
            to_json(&TypedValue::mapping(map)),
            json!({"Name": "box", "ratio": null, "f": {"$type": "function", "name": "f"}})
        );
    }

    #[test]
    fn test_error_projection() {
        assert_eq!(
            to_json(&TypedValue::error("runtime", "bad")),
            json!({"$type": "error", "kind": "runtime", "message": "bad", "data": null})
        );
    }

    #[test]
    fn test_from_json() {
        let value = from_json(&json!({"a": [1, 2.5, "x"], "B": true}));
        let map = value.as_mapping().expect("mapping");
        assert_eq!(map.get("b").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(to_json(&value), json!({"a": [1, 2.5, "x"], "B": true}));
    }

    #[test]
    fn test_native_stringify_drops_functions() {
        let value = NativeValue::object([
            ("n", NativeValue::Number(3.0)),
            ("f", NativeValue::function("f", |_| Ok(NativeValue::Undefined))),
            ("xs", NativeValue::array(vec![NativeValue::Undefined, NativeValue::Bool(true)])),
        ]);
        assert_eq!(
            native_to_json(&value).unwrap(),
            Some(json!({"n": 3, "xs": [null, true]}))
        );
        assert_eq!(native_to_json(&NativeValue::Undefined).unwrap(), None);
    }

    #[test]
    fn test_native_stringify_rejects_cycles() {
        let value = NativeValue::object::<String>([]);
        if let NativeValue::Object(inner) = &value {
            inner.modify().unwrap().insert("self".to_string(), value.clone());
        }
        assert!(native_to_json(&value).is_err());
    }
}
