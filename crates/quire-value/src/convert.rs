//! Conversion between typed values and native host values.
//!
//! Typed → native is total. Native → typed fails only on cyclic
//! structures, which are detected with an explicit stack of the
//! container identities currently being converted.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::FromPrimitive;

use crate::error::{ValueError, ValueResult};
use crate::native::{Callable, NativeFunction, NativeValue};
use crate::typed::{FunctionValue, TypedList, TypedMap, TypedValue};

/// Largest magnitude at which every integer is exactly representable as a
/// double.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Convert a typed value to its natural host representation.
///
/// Containers that were produced from native values hand back their
/// original native object, preserving identity, unless that object has
/// been modified since.
pub fn to_native(value: &TypedValue) -> NativeValue {
    match value {
        TypedValue::Null => NativeValue::Null,
        TypedValue::Boolean(b) => NativeValue::Bool(*b),
        TypedValue::Integer(i) => {
            if i.unsigned_abs() <= MAX_EXACT_INTEGER {
                NativeValue::Number(*i as f64)
            } else {
                NativeValue::BigInt(Rc::new(BigInt::from(*i)))
            }
        }
        TypedValue::Float(x) => NativeValue::Number(*x),
        TypedValue::BigInt(n) => NativeValue::BigInt(n.clone()),
        TypedValue::String(s) => NativeValue::String(s.clone()),
        TypedValue::DateTime(d) => NativeValue::Date(*d),
        TypedValue::Bytes(b) => NativeValue::Bytes(b.clone()),
        TypedValue::List(list) => match list.origin() {
            Some(origin) => NativeValue::Array(origin.clone()),
            None => NativeValue::array(list.items().iter().map(to_native).collect()),
        },
        TypedValue::Mapping(map) => match map.origin() {
            Some(origin) => NativeValue::Object(origin.clone()),
            None => NativeValue::object(
                map.iter()
                    .map(|(key, value)| (key.to_string(), to_native(&value))),
            ),
        },
        TypedValue::Function(FunctionValue::Native(func)) => NativeValue::Function(func.clone()),
        TypedValue::Function(func) => NativeValue::Function(NativeFunction::new(Bridge(func.clone()))),
        TypedValue::Error(err) => NativeValue::object([
            ("type", NativeValue::string(&err.kind)),
            ("message", NativeValue::string(&err.message)),
            ("data", err.payload.as_ref().map_or(NativeValue::Null, to_native)),
        ]),
        TypedValue::Signal(marker) => NativeValue::Opaque(*marker),
    }
}

/// A typed function exposed to native callers.
struct Bridge(FunctionValue);

impl Callable for Bridge {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn call(&self, args: &[NativeValue]) -> ValueResult<NativeValue> {
        self.0.call_native(args)
    }
}

/// Convert a native value to a typed value.
pub fn to_typed(value: &NativeValue) -> ValueResult<TypedValue> {
    to_typed_inner(value, &mut Vec::new())
}

fn to_typed_inner(value: &NativeValue, stack: &mut Vec<*const ()>) -> ValueResult<TypedValue> {
    Ok(match value {
        NativeValue::Undefined | NativeValue::Null => TypedValue::Null,
        NativeValue::Bool(b) => TypedValue::Boolean(*b),
        NativeValue::Number(n) => classify_number(*n),
        NativeValue::BigInt(n) => TypedValue::from_bigint(n.as_ref().clone()),
        NativeValue::String(s) => TypedValue::String(s.clone()),
        NativeValue::Date(d) => TypedValue::DateTime(*d),
        NativeValue::Bytes(b) => TypedValue::Bytes(b.clone()),
        NativeValue::Array(array) => {
            let identity = Rc::as_ptr(array) as *const ();
            enter(stack, identity)?;
            let items = array
                .borrow()
                .iter()
                .map(|item| to_typed_inner(item, stack))
                .collect::<ValueResult<Vec<_>>>();
            stack.pop();
            TypedValue::List(Rc::new(TypedList::with_origin(items?, array.clone())))
        }
        NativeValue::Object(object) => {
            let identity = Rc::as_ptr(object) as *const ();
            enter(stack, identity)?;
            let mut map = TypedMap::new().with_origin(object.clone());
            let converted: ValueResult<()> = object.borrow().iter().try_for_each(|(key, item)| {
                map.insert(key.clone(), to_typed_inner(item, stack)?);
                Ok(())
            });
            stack.pop();
            converted?;
            TypedValue::mapping(map)
        }
        NativeValue::Function(func) => TypedValue::Function(FunctionValue::Native(func.clone())),
        NativeValue::Opaque(marker) => TypedValue::Signal(*marker),
    })
}

fn enter(stack: &mut Vec<*const ()>, identity: *const ()) -> ValueResult<()> {
    if stack.contains(&identity) {
        return Err(ValueError::CyclicValue);
    }
    stack.push(identity);
    Ok(())
}

/// Numbers become integers when integral: 64-bit within the exact range,
/// big integers beyond it. Non-finite numbers become null.
fn classify_number(n: f64) -> TypedValue {
    if !n.is_finite() {
        TypedValue::Null
    } else if n.fract() != 0.0 {
        TypedValue::Float(n)
    } else if n.abs() <= MAX_SAFE_INTEGER {
        TypedValue::Integer(n as i64)
    } else {
        BigInt::from_f64(n).map_or(TypedValue::Float(n), TypedValue::from_bigint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_classification() {
        assert!(matches!(to_typed(&NativeValue::Number(3.0)), Ok(TypedValue::Integer(3))));
        assert!(matches!(to_typed(&NativeValue::Number(-0.0)), Ok(TypedValue::Integer(0))));
        assert!(matches!(to_typed(&NativeValue::Number(2.5)), Ok(TypedValue::Float(x)) if x == 2.5));
        assert!(matches!(to_typed(&NativeValue::Number(1e30)), Ok(TypedValue::BigInt(_))));
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(to_typed(&NativeValue::Number(n)), Ok(TypedValue::Null)));
        }
    }

    #[test]
    fn test_containers_keep_native_origin() {
        let array = NativeValue::array(vec![NativeValue::Number(1.0)]);
        let typed = to_typed(&array).unwrap();
        let back = to_native(&typed);
        assert!(back.strict_equals(&array));
    }

    #[test]
    fn test_modified_origin_is_not_reused() {
        let array = NativeValue::array(vec![NativeValue::Number(1.0)]);
        let typed = to_typed(&array).unwrap();
        if let NativeValue::Array(inner) = &array {
            inner.modify().unwrap().push(NativeValue::Number(2.0));
        }
        let back = to_native(&typed);
        assert!(!back.strict_equals(&array));
        let NativeValue::Array(items) = back else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 1);
    }

    #[test]
    fn test_frozen_containers_reject_mutation() {
        let inner = NativeValue::array(vec![]);
        let outer = NativeValue::object([("items", inner.clone())]);
        outer.freeze();
        let NativeValue::Array(items) = &inner else {
            panic!("expected array");
        };
        assert!(items.is_frozen());
        assert_eq!(
            items.modify().map(|_| ()).unwrap_err().to_string(),
            "cannot modify a read-only value"
        );
    }

    #[test]
    fn test_integers_past_two_to_the_53_stay_exact() {
        let exact = to_native(&TypedValue::Integer(1 << 53));
        assert!(matches!(exact, NativeValue::Number(n) if n == 9_007_199_254_740_992.0));
        let above = to_native(&TypedValue::Integer((1 << 53) + 1));
        let NativeValue::BigInt(n) = &above else {
            panic!("expected bigint, got {above:?}");
        };
        assert_eq!(n.to_string(), "9007199254740993");
        assert!(matches!(to_native(&TypedValue::Integer(-(1 << 53) - 1)), NativeValue::BigInt(_)));
        assert!(matches!(to_typed(&above), Ok(TypedValue::Integer(9_007_199_254_740_993))));
    }

    #[test]
    fn test_fresh_containers_are_rebuilt() {
        let typed = TypedValue::list(vec![TypedValue::Integer(1), TypedValue::from("a")]);
        let NativeValue::Array(items) = to_native(&typed) else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 2);
        assert_eq!(items.borrow()[1].as_str(), Some("a"));
    }

    #[test]
    fn test_cyclic_array_is_rejected() {
        let array = NativeValue::array(vec![]);
        if let NativeValue::Array(inner) = &array {
            inner.modify().unwrap().push(array.clone());
        }
        assert_eq!(to_typed(&array).unwrap_err(), ValueError::CyclicValue);
        assert_eq!(ValueError::CyclicValue.to_string(), "cannot convert cyclic value");
    }

    #[test]
    fn test_shared_acyclic_values_are_allowed() {
        let shared = NativeValue::object([("x", NativeValue::Number(1.0))]);
        let outer = NativeValue::array(vec![shared.clone(), shared]);
        let typed = to_typed(&outer).unwrap();
        assert_eq!(typed.as_list().map(TypedList::len), Some(2));
    }

    #[test]
    fn test_error_tag_becomes_record() {
        let native = to_native(&TypedValue::error("runtime", "boom"));
        let NativeValue::Object(object) = native else {
            panic!("expected object");
        };
        let object = object.borrow();
        assert_eq!(object.get("type").and_then(NativeValue::as_str), Some("runtime"));
        assert_eq!(object.get("message").and_then(NativeValue::as_str), Some("boom"));
        assert!(matches!(object.get("data"), Some(NativeValue::Null)));
    }

    #[test]
    fn test_typed_function_bridges_to_native() {
        let double = FunctionValue::from_fn("double", |args| {
            let n = args.first().and_then(TypedValue::as_i64).unwrap_or(0);
            Ok(TypedValue::Integer(n * 2))
        });
        let NativeValue::Function(native) = to_native(&TypedValue::Function(double)) else {
            panic!("expected function");
        };
        assert_eq!(native.name(), "double");
        let result = native.call(&[NativeValue::Number(21.0)]).unwrap();
        assert_eq!(result.as_number(), Some(42.0));
    }

    #[test]
    fn test_native_function_round_trips() {
        let func = NativeValue::function("id", |args| Ok(args.first().cloned().unwrap_or(NativeValue::Undefined)));
        let typed = to_typed(&func).unwrap();
        assert!(to_native(&typed).strict_equals(&func));
    }

    #[test]
    fn test_signal_is_opaque() {
        assert!(matches!(to_native(&TypedValue::Signal("state")), NativeValue::Opaque("state")));
    }
}
