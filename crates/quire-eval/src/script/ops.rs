//! Operator semantics and property access on native values.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use quire_types::ast::script::BinOp;
use quire_value::{format_number, NativeValue};

use crate::error::{EvalError, EvalResult};

// ══════════════════════════════════════════════════════════════════════
// Binary operators
// ══════════════════════════════════════════════════════════════════════

pub(crate) fn binary(op: BinOp, lv: &NativeValue, rv: &NativeValue) -> EvalResult<NativeValue> {
    match op {
        BinOp::Add => add(lv, rv),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => arithmetic(op, lv, rv),
        BinOp::Eq => Ok(NativeValue::Bool(lv.loose_equals(rv))),
        BinOp::NotEq => Ok(NativeValue::Bool(!lv.loose_equals(rv))),
        BinOp::StrictEq => Ok(NativeValue::Bool(lv.strict_equals(rv))),
        BinOp::StrictNotEq => Ok(NativeValue::Bool(!lv.strict_equals(rv))),
        BinOp::Less | BinOp::Greater | BinOp::LessEq | BinOp::GreaterEq => {
            let result = match relational(lv, rv) {
                Some(ordering) => match op {
                    BinOp::Less => ordering == Ordering::Less,
                    BinOp::Greater => ordering == Ordering::Greater,
                    BinOp::LessEq => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                // NaN is unordered
                None => false,
            };
            Ok(NativeValue::Bool(result))
        }
    }
}

/// Convert containers to their primitive string form for `+`.
fn to_primitive(value: &NativeValue) -> NativeValue {
    match value {
        NativeValue::Array(_) | NativeValue::Object(_) | NativeValue::Function(_) | NativeValue::Date(_) => {
            NativeValue::string(value.to_string())
        }
        other => other.clone(),
    }
}

fn add(lv: &NativeValue, rv: &NativeValue) -> EvalResult<NativeValue> {
    let (lp, rp) = (to_primitive(lv), to_primitive(rv));
    match (&lp, &rp) {
        (NativeValue::String(a), b) => Ok(NativeValue::string(format!("{a}{b}"))),
        (a, NativeValue::String(b)) => Ok(NativeValue::string(format!("{a}{b}"))),
        _ => arithmetic(BinOp::Add, &lp, &rp),
    }
}

fn arithmetic(op: BinOp, lv: &NativeValue, rv: &NativeValue) -> EvalResult<NativeValue> {
    match (lv, rv) {
        (NativeValue::BigInt(a), NativeValue::BigInt(b)) => bigint_op(op, a, b),
        (NativeValue::BigInt(_), _) | (_, NativeValue::BigInt(_)) => Err(EvalError::type_mismatch(
            "cannot mix BigInt and other types, use explicit conversions",
        )),
        _ => {
            let (a, b) = (lv.to_number(), rv.to_number());
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Mod => a % b,
                _ => a.powf(b),
            };
            Ok(NativeValue::Number(result))
        }
    }
}

fn bigint_op(op: BinOp, a: &BigInt, b: &BigInt) -> EvalResult<NativeValue> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::Mod if b.is_zero() => {
            return Err(EvalError::Arithmetic("division by zero".into()))
        }
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        _ => {
            if b.is_negative() {
                return Err(EvalError::Arithmetic("exponent must be non-negative".into()));
            }
            let exp = b
                .to_u32()
                .ok_or_else(|| EvalError::Arithmetic("exponent is too large".into()))?;
            a.pow(exp)
        }
    };
    Ok(NativeValue::BigInt(Rc::new(result)))
}

/// Ordering for relational operators: strings compare lexically,
/// everything else numerically.
pub(crate) fn relational(lv: &NativeValue, rv: &NativeValue) -> Option<Ordering> {
    match (to_primitive(lv), to_primitive(rv)) {
        (NativeValue::String(a), NativeValue::String(b)) => Some(a.cmp(&b)),
        (NativeValue::BigInt(a), NativeValue::BigInt(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

// ══════════════════════════════════════════════════════════════════════
// Properties
// ══════════════════════════════════════════════════════════════════════

/// The property key an index value designates.
pub(crate) fn property_key(index: &NativeValue) -> String {
    match index {
        NativeValue::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

/// A key that names an array slot.
pub(crate) fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

pub(crate) fn get_property(object: &NativeValue, key: &str) -> EvalResult<NativeValue> {
    match object {
        NativeValue::Null => Err(EvalError::NullAccess(key.to_string())),
        NativeValue::Undefined => Err(EvalError::type_mismatch(format!(
            "cannot read '{key}' of undefined"
        ))),
        NativeValue::Array(items) => {
            let items = items.borrow();
            if key == "length" {
                return Ok(NativeValue::Number(items.len() as f64));
            }
            Ok(array_index(key)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(NativeValue::Undefined))
        }
        NativeValue::String(s) => {
            if key == "length" {
                return Ok(NativeValue::Number(s.chars().count() as f64));
            }
            Ok(array_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| NativeValue::string(c.to_string()))
                .unwrap_or(NativeValue::Undefined))
        }
        NativeValue::Bytes(bytes) => {
            if key == "length" {
                return Ok(NativeValue::Number(bytes.len() as f64));
            }
            Ok(array_index(key)
                .and_then(|i| bytes.get(i))
                .map(|b| NativeValue::Number(f64::from(*b)))
                .unwrap_or(NativeValue::Undefined))
        }
        NativeValue::Object(map) => Ok(map.borrow().get(key).cloned().unwrap_or(NativeValue::Undefined)),
        NativeValue::Function(func) if key == "name" => Ok(NativeValue::string(func.name())),
        _ => Ok(NativeValue::Undefined),
    }
}

/// Longest array a script may grow by assigning `length` or an index.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub(crate) fn set_property(object: &NativeValue, key: &str, value: NativeValue) -> EvalResult<()> {
    match object {
        NativeValue::Object(map) => {
            map.modify()?.insert(key.to_string(), value);
            Ok(())
        }
        NativeValue::Array(items) => {
            let mut items = items.modify()?;
            if key == "length" {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || len > MAX_ARRAY_LENGTH as f64 {
                    return Err(EvalError::runtime("invalid array length"));
                }
                items.resize(len as usize, NativeValue::Undefined);
                return Ok(());
            }
            let Some(index) = array_index(key) else {
                return Err(EvalError::type_mismatch(format!(
                    "cannot set property '{key}' on an array"
                )));
            };
            if index >= MAX_ARRAY_LENGTH {
                return Err(EvalError::runtime("invalid array length"));
            }
            if index >= items.len() {
                items.resize(index + 1, NativeValue::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        NativeValue::Null => Err(EvalError::type_mismatch(format!("cannot set '{key}' of null"))),
        NativeValue::Undefined => Err(EvalError::type_mismatch(format!(
            "cannot set '{key}' of undefined"
        ))),
        other => Err(EvalError::type_mismatch(format!(
            "cannot set property '{key}' on a {}",
            other.type_of()
        ))),
    }
}

/// `delete object[key]`.
pub(crate) fn delete_property(object: &NativeValue, key: &str) -> EvalResult<bool> {
    match object {
        NativeValue::Object(map) => {
            map.modify()?.shift_remove(key);
            Ok(true)
        }
        NativeValue::Array(items) => {
            if let Some(index) = array_index(key) {
                if let Some(slot) = items.modify()?.get_mut(index) {
                    *slot = NativeValue::Undefined;
                }
            }
            Ok(true)
        }
        NativeValue::Null | NativeValue::Undefined => Err(EvalError::type_mismatch(format!(
            "cannot delete '{key}' of {object}"
        ))),
        _ => Ok(true),
    }
}

/// The message a thrown value reports.
pub(crate) fn thrown_message(value: &NativeValue) -> String {
    if let NativeValue::Object(map) = value {
        if let Some(NativeValue::String(message)) = map.borrow().get("message") {
            return message.to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> NativeValue {
        NativeValue::Number(n)
    }

    #[test]
    fn test_add_concatenates_with_strings() {
        let result = binary(BinOp::Add, &NativeValue::string("a"), &num(1.0)).unwrap();
        assert_eq!(result.as_str(), Some("a1"));
        let array = NativeValue::array(vec![num(1.0), num(2.0)]);
        let result = binary(BinOp::Add, &array, &NativeValue::string("!")).unwrap();
        assert_eq!(result.as_str(), Some("1,2!"));
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        let result = binary(BinOp::Div, &num(1.0), &num(0.0)).unwrap();
        assert_eq!(result.as_number(), Some(f64::INFINITY));
    }

    #[test]
    fn test_bigint_mixing_fails() {
        let big = NativeValue::BigInt(Rc::new(BigInt::from(5)));
        assert!(binary(BinOp::Add, &big, &num(1.0)).is_err());
        let sum = binary(BinOp::Add, &big, &big).unwrap();
        assert_eq!(sum.to_string(), "10");
    }

    #[test]
    fn test_string_comparison_is_lexical() {
        let result = binary(BinOp::Less, &NativeValue::string("b"), &NativeValue::string("ab")).unwrap();
        assert!(!result.is_truthy());
        let nan = binary(BinOp::Less, &num(f64::NAN), &num(1.0)).unwrap();
        assert!(!nan.is_truthy());
    }

    #[test]
    fn test_array_index_keys() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(property_key(&num(3.0)), "3");
    }

    #[test]
    fn test_set_past_end_extends_array() {
        let array = NativeValue::array(vec![]);
        set_property(&array, "2", num(7.0)).unwrap();
        assert_eq!(get_property(&array, "length").unwrap().as_number(), Some(3.0));
        assert!(matches!(get_property(&array, "0").unwrap(), NativeValue::Undefined));
    }

    #[test]
    fn test_thrown_message_prefers_message_field() {
        let err = NativeValue::object([("message", NativeValue::string("bad input"))]);
        assert_eq!(thrown_message(&err), "bad input");
        assert_eq!(thrown_message(&NativeValue::string("plain")), "plain");
    }
}
