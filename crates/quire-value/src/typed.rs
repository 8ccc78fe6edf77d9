//! The typed value model: the tagged union every evaluation produces.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::convert::{to_native, to_typed};
use crate::error::ValueResult;
use crate::native::{format_number, NativeArray, NativeFunction, NativeObject, NativeValue, Shared};

/// A typed value.
///
/// Containers are immutable and reference-counted; cloning a value is
/// cheap.
#[derive(Debug, Clone)]
pub enum TypedValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Integers that do not fit in 64 bits.
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    DateTime(DateTime<Utc>),
    Bytes(Rc<[u8]>),
    List(Rc<TypedList>),
    Mapping(Rc<TypedMap>),
    Function(FunctionValue),
    Error(Rc<ErrorValue>),
    /// Reactive placeholder tag; carried through but never produced by
    /// evaluation.
    Signal(&'static str),
}

impl TypedValue {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<TypedValue>) -> Self {
        Self::List(Rc::new(TypedList::new(items)))
    }

    pub fn mapping(map: TypedMap) -> Self {
        Self::Mapping(Rc::new(map))
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(Rc::new(ErrorValue {
            kind: kind.into(),
            message: message.into(),
            payload: None,
        }))
    }

    /// Build an integer tag, demoting to 64 bits when the value fits.
    pub fn from_bigint(n: BigInt) -> Self {
        match n.to_i64() {
            Some(i) => Self::Integer(i),
            None => Self::BigInt(Rc::new(n)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Mapping(_) => "mapping",
            Self::Function(_) => "function",
            Self::Error(_) => "error",
            Self::Signal(_) => "signal",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Any numeric tag as a double.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::BigInt(n) => n.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&TypedList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&TypedMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionValue> {
        match self {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    fn write_repr(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{}", format_number(*x)),
            Self::BigInt(n) => write!(f, "{n}"),
            Self::String(s) if nested => write!(f, "{s:?}"),
            Self::String(s) => write!(f, "{s}"),
            Self::DateTime(d) => write!(f, "{}", d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Self::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.items().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_repr(f, true)?;
                }
                write!(f, "]")
            }
            Self::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {key}: ")?;
                    value.write_repr(f, true)?;
                }
                if map.is_empty() {
                    write!(f, "}}")
                } else {
                    write!(f, " }}")
                }
            }
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Error(err) => write!(f, "<{}: {}>", err.kind, err.message),
            Self::Signal(kind) => write!(f, "<signal {kind}>"),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, false)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for TypedValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for TypedValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

/// The error tag's payload.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub kind: String,
    pub message: String,
    pub payload: Option<TypedValue>,
}

// ─────────────────────────────────────────────────────────────────────
// Lists
// ─────────────────────────────────────────────────────────────────────

/// A native container a typed container was converted from, with the
/// container's version at that moment.
struct Origin<T> {
    container: Rc<Shared<T>>,
    version: u64,
}

impl<T> Origin<T> {
    fn new(container: Rc<Shared<T>>) -> Self {
        let version = container.version();
        Self { container, version }
    }

    fn current(&self) -> Option<&Rc<Shared<T>>> {
        (self.container.version() == self.version).then_some(&self.container)
    }
}

impl<T> Clone for Origin<T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            version: self.version,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Origin<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.container.fmt(f)
    }
}

/// An ordered list, optionally remembering the native array it came from.
#[derive(Debug, Clone, Default)]
pub struct TypedList {
    items: Vec<TypedValue>,
    origin: Option<Origin<Vec<NativeValue>>>,
}

impl TypedList {
    pub fn new(items: Vec<TypedValue>) -> Self {
        Self {
            items,
            origin: None,
        }
    }

    pub fn with_origin(items: Vec<TypedValue>, origin: NativeArray) -> Self {
        Self {
            items,
            origin: Some(Origin::new(origin)),
        }
    }

    pub fn items(&self) -> &[TypedValue] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&TypedValue> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The native array this list was converted from, while that array
    /// is unmodified.
    pub fn origin(&self) -> Option<&NativeArray> {
        self.origin.as_ref().and_then(Origin::current)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Mappings
// ─────────────────────────────────────────────────────────────────────

/// Lookup form of a key: mapping keys compare case-insensitively.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// A value computed on first read and then kept.
struct Lazy {
    value: OnceCell<TypedValue>,
    thunk: Box<dyn Fn() -> TypedValue>,
}

impl Lazy {
    fn force(&self) -> TypedValue {
        if let Some(value) = self.value.get() {
            return value.clone();
        }
        let value = (self.thunk)();
        // A reentrant read may already have filled the cell; keep the first.
        match self.value.set(value) {
            Ok(()) => self.value.get().cloned().unwrap_or(TypedValue::Null),
            Err(value) => self.value.get().cloned().unwrap_or(value),
        }
    }
}

enum Slot {
    Ready(TypedValue),
    Lazy(Lazy),
}

struct Entry {
    /// Key as first written.
    key: String,
    slot: Slot,
}

impl Entry {
    fn value(&self) -> TypedValue {
        match &self.slot {
            Slot::Ready(value) => value.clone(),
            Slot::Lazy(lazy) => lazy.force(),
        }
    }
}

/// An insertion-ordered mapping with case-preserving, case-insensitive
/// keys. Entries may be lazy: their value is computed when first read.
#[derive(Default)]
pub struct TypedMap {
    entries: IndexMap<String, Entry>,
    origin: Option<Origin<IndexMap<String, NativeValue>>>,
}

impl TypedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the native object this mapping was converted from.
    pub fn with_origin(mut self, origin: NativeObject) -> Self {
        self.origin = Some(Origin::new(origin));
        self
    }

    /// Add an entry unless a key with the same normalized form exists.
    /// Returns `false` when the entry was dropped.
    pub fn insert(&mut self, key: impl Into<String>, value: TypedValue) -> bool {
        self.insert_slot(key.into(), Slot::Ready(value))
    }

    /// Add an entry whose value is computed on first read.
    pub fn insert_lazy<F>(&mut self, key: impl Into<String>, thunk: F) -> bool
    where
        F: Fn() -> TypedValue + 'static,
    {
        let lazy = Lazy {
            value: OnceCell::new(),
            thunk: Box::new(thunk),
        };
        self.insert_slot(key.into(), Slot::Lazy(lazy))
    }

    fn insert_slot(&mut self, key: String, slot: Slot) -> bool {
        let normalized = normalize_key(&key);
        if self.entries.contains_key(&normalized) {
            return false;
        }
        self.entries.insert(normalized, Entry { key, slot });
        true
    }

    /// Add or overwrite an entry. An overwritten entry keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: TypedValue) {
        let key = key.into();
        let normalized = normalize_key(&key);
        self.entries.insert(
            normalized,
            Entry {
                key,
                slot: Slot::Ready(value),
            },
        );
    }

    /// Case-insensitive lookup. Forces a lazy entry.
    pub fn get(&self, key: &str) -> Option<TypedValue> {
        self.entries.get(&normalize_key(key)).map(Entry::value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Keys as written, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.key.as_str())
    }

    /// Entries in insertion order. Forces every lazy entry it reaches.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TypedValue)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The native object this mapping was converted from, while that
    /// object is unmodified.
    pub fn origin(&self) -> Option<&NativeObject> {
        self.origin.as_ref().and_then(Origin::current)
    }
}

impl fmt::Debug for TypedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.entries.values() {
            match &entry.slot {
                Slot::Ready(value) => map.entry(&entry.key, value),
                Slot::Lazy(lazy) => match lazy.value.get() {
                    Some(value) => map.entry(&entry.key, value),
                    None => map.entry(&entry.key, &format_args!("<lazy>")),
                },
            };
        }
        map.finish()
    }
}

impl<K: Into<String>> FromIterator<(K, TypedValue)> for TypedMap {
    fn from_iter<I: IntoIterator<Item = (K, TypedValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

// ─────────────────────────────────────────────────────────────────────
// Functions
// ─────────────────────────────────────────────────────────────────────

/// A function that takes and returns typed values.
pub trait TypedCallable {
    fn name(&self) -> &str;

    fn call(&self, args: &[TypedValue]) -> ValueResult<TypedValue>;
}

struct FnTyped<F> {
    name: String,
    f: F,
}

impl<F> TypedCallable for FnTyped<F>
where
    F: Fn(&[TypedValue]) -> ValueResult<TypedValue>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[TypedValue]) -> ValueResult<TypedValue> {
        (self.f)(args)
    }
}

/// The function tag: either a native callable (from a script) or a
/// typed callable (formula lambdas, host built-ins).
#[derive(Clone)]
pub enum FunctionValue {
    Native(NativeFunction),
    Typed(Rc<dyn TypedCallable>),
}

impl FunctionValue {
    pub fn new(callable: impl TypedCallable + 'static) -> Self {
        Self::Typed(Rc::new(callable))
    }

    /// Wrap a plain closure over typed values.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[TypedValue]) -> ValueResult<TypedValue> + 'static,
    {
        Self::new(FnTyped {
            name: name.into(),
            f,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Native(func) => func.name(),
            Self::Typed(func) => func.name(),
        }
    }

    /// Call with typed arguments; native functions see converted values.
    pub fn call(&self, args: &[TypedValue]) -> ValueResult<TypedValue> {
        match self {
            Self::Typed(func) => func.call(args),
            Self::Native(func) => {
                let args: Vec<NativeValue> = args.iter().map(to_native).collect();
                to_typed(&func.call(&args)?)
            }
        }
    }

    /// Call with native arguments; typed functions see converted values.
    pub fn call_native(&self, args: &[NativeValue]) -> ValueResult<NativeValue> {
        match self {
            Self::Native(func) => func.call(args),
            Self::Typed(func) => {
                let args = args.iter().map(to_typed).collect::<ValueResult<Vec<_>>>()?;
                Ok(to_native(&func.call(&args)?))
            }
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            (Self::Typed(a), Self::Typed(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_map_keys_are_case_insensitive_and_first_wins() {
        let mut map = TypedMap::new();
        assert!(map.insert("Width", TypedValue::Integer(1)));
        assert!(!map.insert("width", TypedValue::Integer(2)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("WIDTH").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Width"]);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut map = TypedMap::new();
        map.insert("a", TypedValue::Integer(1));
        map.insert("b", TypedValue::Integer(2));
        map.set("A", TypedValue::Integer(3));
        let entries: Vec<_> = map.iter().map(|(k, v)| (k.to_string(), v.as_i64())).collect();
        assert_eq!(
            entries,
            vec![("A".to_string(), Some(3)), ("b".to_string(), Some(2))]
        );
    }

    #[test]
    fn test_lazy_entries_are_computed_once_on_read() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut map = TypedMap::new();
        map.insert_lazy("x", move || {
            counter.set(counter.get() + 1);
            TypedValue::Integer(7)
        });
        assert_eq!(calls.get(), 0);
        assert!(map.contains_key("X"));
        assert_eq!(calls.get(), 0);
        assert_eq!(map.get("x").and_then(|v| v.as_i64()), Some(7));
        assert_eq!(map.get("x").and_then(|v| v.as_i64()), Some(7));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_display() {
        let mut map = TypedMap::new();
        map.insert("name", TypedValue::from("box"));
        map.insert("sizes", TypedValue::list(vec![1i64.into(), 2.5.into()]));
        let value = TypedValue::mapping(map);
        assert_eq!(value.to_string(), r#"{ name: "box", sizes: [1, 2.5] }"#);
        assert_eq!(TypedValue::from("plain").to_string(), "plain");
    }

    #[test]
    fn test_from_bigint_demotes() {
        assert!(matches!(TypedValue::from_bigint(BigInt::from(5)), TypedValue::Integer(5)));
        let big = BigInt::from(i64::MAX) * 4;
        assert!(matches!(TypedValue::from_bigint(big), TypedValue::BigInt(_)));
    }
}
