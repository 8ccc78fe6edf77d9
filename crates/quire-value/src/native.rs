//! Native host values: the representation scripts compute with.
//!
//! Arrays and objects are shared, mutable references, so reference
//! identity is observable (`a === b` compares pointers). Once frozen, a
//! container rejects every mutation.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::error::{ValueError, ValueResult};

pub type NativeArray = Rc<Shared<Vec<NativeValue>>>;
pub type NativeObject = Rc<Shared<IndexMap<String, NativeValue>>>;

/// Interior-mutable storage behind a native array or object.
///
/// Every mutation bumps `version`, which lets a converted value check that
/// the container still holds what it saw.
#[derive(Debug, Default)]
pub struct Shared<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    frozen: Cell<bool>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            version: Cell::new(0),
            frozen: Cell::new(false),
        }
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    /// Mutable access. Fails on a frozen container.
    pub fn modify(&self) -> ValueResult<RefMut<'_, T>> {
        if self.frozen.get() {
            return Err(ValueError::runtime("cannot modify a read-only value"));
        }
        self.version.set(self.version.get() + 1);
        Ok(self.value.borrow_mut())
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }
}

/// Something a script can call.
pub trait Callable {
    /// Name shown in stack traces and placeholders.
    fn name(&self) -> &str;

    fn call(&self, args: &[NativeValue]) -> ValueResult<NativeValue>;

    /// Concrete-type access for callers that special-case their own
    /// callables.
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

/// A shared handle to a [`Callable`].
#[derive(Clone)]
pub struct NativeFunction(Rc<dyn Callable>);

struct FnCallable<F> {
    name: String,
    f: F,
}

impl<F> Callable for FnCallable<F>
where
    F: Fn(&[NativeValue]) -> ValueResult<NativeValue>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[NativeValue]) -> ValueResult<NativeValue> {
        (self.f)(args)
    }
}

impl NativeFunction {
    pub fn new(callable: impl Callable + 'static) -> Self {
        Self(Rc::new(callable))
    }

    /// Wrap a plain closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[NativeValue]) -> ValueResult<NativeValue> + 'static,
    {
        Self::new(FnCallable {
            name: name.into(),
            f,
        })
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn call(&self, args: &[NativeValue]) -> ValueResult<NativeValue> {
        self.0.call(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The underlying callable, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

/// A host value.
#[derive(Debug, Clone)]
pub enum NativeValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Date(DateTime<Utc>),
    Bytes(Rc<[u8]>),
    Array(NativeArray),
    Object(NativeObject),
    Function(NativeFunction),
    /// A value with no host representation, identified by a marker name.
    Opaque(&'static str),
}

impl NativeValue {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<NativeValue>) -> Self {
        Self::Array(Rc::new(Shared::new(items)))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, NativeValue)>) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Object(Rc::new(Shared::new(map)))
    }

    /// Make this value and every container reachable from it read-only.
    pub fn freeze(&self) {
        match self {
            Self::Array(items) if !items.is_frozen() => {
                items.frozen.set(true);
                items.borrow().iter().for_each(NativeValue::freeze);
            }
            Self::Object(map) if !map.is_frozen() => {
                map.frozen.set(true);
                map.borrow().values().for_each(NativeValue::freeze);
            }
            _ => {}
        }
    }

    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[NativeValue]) -> ValueResult<NativeValue> + 'static,
    {
        Self::Function(NativeFunction::from_fn(name, f))
    }

    /// The result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null
            | Self::Date(_)
            | Self::Bytes(_)
            | Self::Array(_)
            | Self::Object(_)
            | Self::Opaque(_) => "object",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::BigInt(n) => !n.is_zero(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Strict equality (`===`): primitives by value, references by identity.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => Rc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality (`==`): `null == undefined`, numbers compare with
    /// numeric strings and booleans; everything else is strict.
    pub fn loose_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (Self::Number(a), Self::String(b)) | (Self::String(b), Self::Number(a)) => {
                parse_number(b) == *a
            }
            (Self::Bool(a), b) | (b, Self::Bool(a)) if !matches!(b, Self::Bool(_)) => {
                Self::Number(if *a { 1.0 } else { 0.0 }).loose_equals(b)
            }
            _ => self.strict_equals(other),
        }
    }

    /// Numeric conversion (`+value`).
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::BigInt(n) => num_traits::ToPrimitive::to_f64(n.as_ref()).unwrap_or(f64::NAN),
            Self::String(s) => parse_number(s),
            Self::Date(d) => d.timestamp_millis() as f64,
            Self::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }
}

/// Parse a string the way numeric conversion does: trimmed, empty is zero.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

/// Format a number the way scripts print it: integral values without a
/// fraction, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{:.0}", n + 0.0)
    } else {
        n.to_string()
    }
}

impl NativeValue {
    fn write_display(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<*const ()>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::BigInt(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            Self::Bytes(bytes) => write!(f, "[bytes {}]", bytes.len()),
            Self::Array(items) => {
                // An array nested inside itself prints as empty
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) {
                    return Ok(());
                }
                seen.push(ptr);
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        item.write_display(f, seen)?;
                    }
                }
                seen.pop();
                Ok(())
            }
            Self::Object(_) => write!(f, "[object Object]"),
            Self::Function(func) => write!(f, "function {}() {{ [native code] }}", func.name()),
            Self::Opaque(marker) => write!(f, "[{marker}]"),
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_display(f, &mut Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_truthiness() {
        assert!(!NativeValue::Number(0.0).is_truthy());
        assert!(!NativeValue::string("").is_truthy());
        assert!(NativeValue::array(vec![]).is_truthy());
        assert!(!NativeValue::Undefined.is_truthy());
    }

    #[test]
    fn test_strict_equality_uses_identity_for_arrays() {
        let a = NativeValue::array(vec![NativeValue::Number(1.0)]);
        let b = NativeValue::array(vec![NativeValue::Number(1.0)]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
    }

    #[test]
    fn test_loose_equality() {
        assert!(NativeValue::Null.loose_equals(&NativeValue::Undefined));
        assert!(NativeValue::Number(1.0).loose_equals(&NativeValue::string("1")));
        assert!(NativeValue::Bool(true).loose_equals(&NativeValue::Number(1.0)));
        assert!(!NativeValue::Null.loose_equals(&NativeValue::Number(0.0)));
    }

    #[test]
    fn test_array_display_joins_with_commas() {
        let arr = NativeValue::array(vec![
            NativeValue::Number(1.0),
            NativeValue::Null,
            NativeValue::string("x"),
        ]);
        assert_eq!(arr.to_string(), "1,,x");
    }

    #[test]
    fn test_typeof() {
        assert_eq!(NativeValue::Null.type_of(), "object");
        assert_eq!(NativeValue::function("f", |_| Ok(NativeValue::Undefined)).type_of(), "function");
    }
}
