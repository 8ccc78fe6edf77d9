//! Member access and built-in methods on formula values.
//!
//! `xs.map` evaluates to a function bound to `xs`, so `xs.map(f)` is an
//! ordinary call of that function.

use std::rc::Rc;

use quire_value::{FunctionValue, TypedList, TypedMap, TypedValue, ValueError};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{raise, values_equal};

const LIST_METHODS: &[&str] = &["map", "filter", "reduce", "concat", "slice", "join", "contains"];
const STRING_METHODS: &[&str] = &["upper", "lower", "trim", "split", "contains"];
const MAPPING_METHODS: &[&str] = &["keys", "values", "has"];

/// Evaluate `object.name`.
pub(crate) fn member(object: &TypedValue, name: &str) -> EvalResult<TypedValue> {
    match object {
        TypedValue::Null => Err(EvalError::NullAccess(name.to_string())),
        TypedValue::Error(err) => Err(raise(name, err)),
        TypedValue::Mapping(map) => {
            if map.contains_key(name) {
                return mapping_get(map, name);
            }
            match find(MAPPING_METHODS, name) {
                Some(method) => Ok(bind_mapping_method(map.clone(), method)),
                None => Ok(TypedValue::Null),
            }
        }
        TypedValue::List(list) => {
            if name == "length" {
                return Ok(TypedValue::Integer(list.len() as i64));
            }
            match find(LIST_METHODS, name) {
                Some(method) => Ok(bind_list_method(list.clone(), method)),
                None => Err(no_member(object, name)),
            }
        }
        TypedValue::String(s) => {
            if name == "length" {
                return Ok(TypedValue::Integer(s.chars().count() as i64));
            }
            match find(STRING_METHODS, name) {
                Some(method) => Ok(bind_string_method(s.clone(), method)),
                None => Err(no_member(object, name)),
            }
        }
        TypedValue::Bytes(bytes) if name == "length" => Ok(TypedValue::Integer(bytes.len() as i64)),
        _ => Err(no_member(object, name)),
    }
}

/// Read a mapping entry. Missing keys are `null`; an error-tag entry fails.
pub(crate) fn mapping_get(map: &TypedMap, key: &str) -> EvalResult<TypedValue> {
    match map.get(key) {
        Some(TypedValue::Error(err)) => Err(raise(key, &err)),
        Some(value) => Ok(value),
        None => Ok(TypedValue::Null),
    }
}

fn find(methods: &[&'static str], name: &str) -> Option<&'static str> {
    methods.iter().copied().find(|m| *m == name)
}

fn no_member(object: &TypedValue, name: &str) -> EvalError {
    EvalError::type_mismatch(format!("{} has no member '{name}'", object.type_name()))
}

fn bind<F>(receiver: &str, method: &'static str, f: F) -> TypedValue
where
    F: Fn(&[TypedValue]) -> EvalResult<TypedValue> + 'static,
{
    TypedValue::Function(FunctionValue::from_fn(
        format!("{receiver}.{method}"),
        move |args| f(args).map_err(ValueError::from),
    ))
}

// ── Argument helpers ─────────────────────────────────────────────────

fn function_arg<'a>(args: &'a [TypedValue], i: usize, method: &str) -> EvalResult<&'a FunctionValue> {
    args.get(i).and_then(TypedValue::as_function).ok_or_else(|| {
        EvalError::type_mismatch(format!("{method} expects a function as argument {}", i + 1))
    })
}

fn string_arg<'a>(args: &'a [TypedValue], i: usize, method: &str) -> EvalResult<&'a str> {
    args.get(i).and_then(TypedValue::as_str).ok_or_else(|| {
        EvalError::type_mismatch(format!("{method} expects a string as argument {}", i + 1))
    })
}

/// An optional integer argument; `null` counts as absent.
fn integer_arg(args: &[TypedValue], i: usize, method: &str) -> EvalResult<Option<i64>> {
    match args.get(i) {
        None | Some(TypedValue::Null) => Ok(None),
        Some(TypedValue::Integer(n)) => Ok(Some(*n)),
        Some(TypedValue::Float(x)) if x.fract() == 0.0 => Ok(Some(*x as i64)),
        Some(other) => Err(EvalError::type_mismatch(format!(
            "{method} expects an integer as argument {}, got {}",
            i + 1,
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative slice bound against `len`.
fn slice_bound(bound: Option<i64>, len: usize, default: usize) -> usize {
    match bound {
        None => default,
        Some(n) if n < 0 => len.saturating_sub(n.unsigned_abs() as usize),
        Some(n) => (n as usize).min(len),
    }
}

/// Callback results that decide membership must be booleans.
fn predicate(value: &TypedValue, method: &str) -> EvalResult<bool> {
    match value {
        TypedValue::Boolean(b) => Ok(*b),
        TypedValue::Null => Ok(false),
        other => Err(EvalError::type_mismatch(format!(
            "{method} callback must return a boolean, got {}",
            other.type_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════
// Lists
// ══════════════════════════════════════════════════════════════════════

fn bind_list_method(list: Rc<TypedList>, method: &'static str) -> TypedValue {
    bind("list", method, move |args| list_method(&list, method, args))
}

fn list_method(list: &TypedList, method: &str, args: &[TypedValue]) -> EvalResult<TypedValue> {
    let items = list.items();
    match method {
        "map" => {
            let f = function_arg(args, 0, "list.map")?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(f.call(&[item.clone(), TypedValue::Integer(i as i64)])?);
            }
            Ok(TypedValue::list(out))
        }
        "filter" => {
            let f = function_arg(args, 0, "list.filter")?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let keep = f.call(&[item.clone(), TypedValue::Integer(i as i64)])?;
                if predicate(&keep, "list.filter")? {
                    out.push(item.clone());
                }
            }
            Ok(TypedValue::list(out))
        }
        "reduce" => {
            let f = function_arg(args, 0, "list.reduce")?;
            let (mut acc, rest) = match args.get(1) {
                Some(init) => (init.clone(), items),
                None => match items.split_first() {
                    Some((first, rest)) => (first.clone(), rest),
                    None => {
                        return Err(EvalError::type_mismatch(
                            "list.reduce of an empty list needs an initial value",
                        ))
                    }
                },
            };
            for item in rest {
                acc = f.call(&[acc, item.clone()])?;
            }
            Ok(acc)
        }
        "concat" => {
            let mut out = items.to_vec();
            for arg in args {
                match arg {
                    TypedValue::List(other) => out.extend(other.items().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(TypedValue::list(out))
        }
        "slice" => {
            let len = items.len();
            let start = slice_bound(integer_arg(args, 0, "list.slice")?, len, 0);
            let end = slice_bound(integer_arg(args, 1, "list.slice")?, len, len);
            let out = if start < end { items[start..end].to_vec() } else { Vec::new() };
            Ok(TypedValue::list(out))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(TypedValue::Null) => ",",
                Some(_) => string_arg(args, 0, "list.join")?,
            };
            let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
            Ok(TypedValue::string(parts.join(sep)))
        }
        "contains" => {
            let needle = args.first().cloned().unwrap_or(TypedValue::Null);
            Ok(TypedValue::Boolean(items.iter().any(|item| values_equal(item, &needle))))
        }
        _ => Err(EvalError::type_mismatch(format!("list has no method '{method}'"))),
    }
}

// ══════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════

fn bind_string_method(s: Rc<str>, method: &'static str) -> TypedValue {
    bind("string", method, move |args| string_method(&s, method, args))
}

fn string_method(s: &str, method: &str, args: &[TypedValue]) -> EvalResult<TypedValue> {
    match method {
        "upper" => Ok(TypedValue::string(s.to_uppercase())),
        "lower" => Ok(TypedValue::string(s.to_lowercase())),
        "trim" => Ok(TypedValue::string(s.trim())),
        "split" => {
            let sep = string_arg(args, 0, "string.split")?;
            let parts: Vec<TypedValue> = if sep.is_empty() {
                s.chars().map(|c| TypedValue::string(c.to_string())).collect()
            } else {
                s.split(sep).map(TypedValue::string).collect()
            };
            Ok(TypedValue::list(parts))
        }
        "contains" => {
            let needle = string_arg(args, 0, "string.contains")?;
            Ok(TypedValue::Boolean(s.contains(needle)))
        }
        _ => Err(EvalError::type_mismatch(format!("string has no method '{method}'"))),
    }
}

// ══════════════════════════════════════════════════════════════════════
// Mappings
// ══════════════════════════════════════════════════════════════════════

fn bind_mapping_method(map: Rc<TypedMap>, method: &'static str) -> TypedValue {
    bind("mapping", method, move |args| mapping_method(&map, method, args))
}

fn mapping_method(map: &TypedMap, method: &str, args: &[TypedValue]) -> EvalResult<TypedValue> {
    match method {
        "keys" => Ok(TypedValue::list(map.keys().map(TypedValue::string).collect())),
        "values" => Ok(TypedValue::list(map.iter().map(|(_, value)| value).collect())),
        "has" => {
            let key = string_arg(args, 0, "mapping.has")?;
            Ok(TypedValue::Boolean(map.contains_key(key)))
        }
        _ => Err(EvalError::type_mismatch(format!("mapping has no method '{method}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> TypedValue {
        TypedValue::list(values.iter().map(|v| TypedValue::Integer(*v)).collect())
    }

    #[test]
    fn test_slice_bounds() {
        assert_eq!(slice_bound(Some(-2), 5, 0), 3);
        assert_eq!(slice_bound(Some(-9), 5, 0), 0);
        assert_eq!(slice_bound(Some(9), 5, 0), 5);
        assert_eq!(slice_bound(None, 5, 5), 5);
    }

    #[test]
    fn test_list_length_and_unknown_member() {
        let list = ints(&[1, 2, 3]);
        assert_eq!(member(&list, "length").unwrap().as_i64(), Some(3));
        assert!(matches!(member(&list, "size"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_mapping_key_shadows_method() {
        let map: TypedMap = [("keys", TypedValue::Integer(7))].into_iter().collect();
        let value = TypedValue::mapping(map);
        assert_eq!(member(&value, "KEYS").unwrap().as_i64(), Some(7));
    }

    #[test]
    fn test_error_entry_raises() {
        let map: TypedMap = [("bad", TypedValue::error("runtime", "boom"))].into_iter().collect();
        let err = mapping_get(&map, "bad").unwrap_err();
        assert_eq!(err.to_string(), "error in dependency 'bad': boom");
    }

    #[test]
    fn test_join_and_contains() {
        let list = ints(&[1, 2]);
        let join = member(&list, "join").unwrap();
        let joined = join.as_function().unwrap().call(&[TypedValue::string("-")]).unwrap();
        assert_eq!(joined.as_str(), Some("1-2"));
        let contains = member(&list, "contains").unwrap();
        let found = contains.as_function().unwrap().call(&[TypedValue::Float(2.0)]).unwrap();
        assert_eq!(found.as_bool(), Some(true));
    }
}
