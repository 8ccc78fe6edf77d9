//! Integration tests for the formula evaluator.
//!
//! Covers literals, operators, integer and big-integer arithmetic, null
//! propagation, closures and scope lookup through a host scope.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use quire_eval::{evaluate, math, EvalError, EvalResult, FormulaContext, FormulaScope};
use quire_parser::parse_formula;
use quire_types::SourceFile;
use quire_value::{TypedMap, TypedValue};
use rustc_hash::FxHashMap;

// ══════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════

/// A host scope backed by a plain map, with `math` at the root.
#[derive(Default)]
struct MapScope(FxHashMap<String, TypedValue>);

impl MapScope {
    fn with(mut self, name: &str, value: TypedValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }
}

impl FormulaScope for MapScope {
    fn lookup(&self, name: &str) -> EvalResult<Option<TypedValue>> {
        if name == "math" {
            return Ok(Some(math::module()));
        }
        Ok(self.0.get(name).cloned())
    }
}

fn eval_in(source: &str, scope: MapScope) -> EvalResult<TypedValue> {
    let sf = SourceFile::new("test.fx", source);
    let expr = match parse_formula(&sf).into_result() {
        Ok(expr) => expr,
        Err(errors) => panic!("parse errors: {:?}", errors.errors),
    };
    let ctx = FormulaContext::new(Rc::new(scope));
    evaluate(&expr, &ctx)
}

fn eval(source: &str) -> TypedValue {
    eval_in(source, MapScope::default()).unwrap()
}

fn eval_err(source: &str) -> EvalError {
    eval_in(source, MapScope::default()).unwrap_err()
}

fn ints(values: &[i64]) -> TypedValue {
    TypedValue::list(values.iter().map(|v| TypedValue::Integer(*v)).collect())
}

// ══════════════════════════════════════════════════════════════════════
// Literals and arithmetic
// ══════════════════════════════════════════════════════════════════════

#[test]
fn empty_formula_is_null() {
    assert!(eval("").is_null());
}

#[test]
fn integer_arithmetic_stays_integral() {
    assert_eq!(eval("1 + 2 * 3").as_i64(), Some(7));
    assert_eq!(eval("6 / 3").as_i64(), Some(2));
    assert!(matches!(eval("7 / 2"), TypedValue::Float(x) if x == 3.5));
    assert_eq!(eval("-7 % 3").as_i64(), Some(-1));
}

#[test]
fn overflow_promotes_to_big_integer() {
    let value = eval("9223372036854775807 + 1");
    assert_eq!(value.type_name(), "bigint");
    assert_eq!(value.to_string(), "9223372036854775808");
    assert_eq!(eval("99999999999999999999 - 99999999999999999998").as_i64(), Some(1));
}

#[test]
fn division_by_zero_fails() {
    assert!(matches!(eval_err("1 / 0"), EvalError::Arithmetic(_)));
    assert!(matches!(eval_err("1.5 / 0"), EvalError::Arithmetic(_)));
}

#[test]
fn string_concatenation_and_interpolation() {
    assert_eq!(eval(r#""a" + 1"#).as_str(), Some("a1"));
    let scope = MapScope::default().with("width", TypedValue::Integer(21));
    assert_eq!(eval_in(r#""w=${width * 2}px""#, scope).unwrap().as_str(), Some("w=42px"));
}

#[test]
fn comparison_across_number_tags() {
    assert_eq!(eval("1 == 1.0").as_bool(), Some(true));
    assert_eq!(eval("99999999999999999999 > 1").as_bool(), Some(true));
    assert_eq!(eval(r#""b" > "a""#).as_bool(), Some(true));
}

// ══════════════════════════════════════════════════════════════════════
// Logic and null handling
// ══════════════════════════════════════════════════════════════════════

#[test]
fn conditionals_require_booleans() {
    assert_eq!(eval("if 1 < 2 then 10 else 20").as_i64(), Some(10));
    assert!(matches!(eval_err("if 1 then 2 else 3"), EvalError::TypeMismatch(_)));
}

#[test]
fn coalesce_picks_first_non_null() {
    assert_eq!(eval("null ?? 4").as_i64(), Some(4));
    assert_eq!(eval("3 ?? 4").as_i64(), Some(3));
}

#[test]
fn member_of_null_fails() {
    let scope = MapScope::default().with("shape", TypedValue::Null);
    let err = eval_in("shape.width", scope).unwrap_err();
    assert_eq!(err.to_string(), "cannot read 'width' of null");
}

#[test]
fn undefined_name_fails() {
    assert_eq!(eval_err("missing + 1").to_string(), "'missing' is not defined");
}

// ══════════════════════════════════════════════════════════════════════
// Collections and lambdas
// ══════════════════════════════════════════════════════════════════════

#[test]
fn list_spread_and_index() {
    let scope = MapScope::default().with("rest", ints(&[2, 3]));
    let value = eval_in("[1, ...rest, 4]", scope).unwrap();
    assert_eq!(value.to_string(), "[1, 2, 3, 4]");
    assert_eq!(eval("[1, 2, 3][1]").as_i64(), Some(2));
    assert!(eval("[1, 2, 3][9]").is_null());
}

#[test]
fn record_keys_are_case_insensitive() {
    let value = eval("{ Width: 3, height: 4 }");
    let map = value.as_mapping().unwrap();
    assert_eq!(map.get("width").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(eval("{ Width: 3 }.WIDTH").as_i64(), Some(3));
}

#[test]
fn let_binds_locally() {
    assert_eq!(eval("let x = 2 in x * x").as_i64(), Some(4));
    let scope = MapScope::default().with("x", TypedValue::Integer(100));
    assert_eq!(eval_in("let x = 1 in x + 1", scope).unwrap().as_i64(), Some(2));
}

#[test]
fn lambdas_capture_their_environment() {
    let value = eval("let k = 10 in [1, 2, 3].map(fn(x) => x * k)");
    assert_eq!(value.to_string(), "[10, 20, 30]");
    assert_eq!(eval("(fn(a, b) => a + b)(2, 3)").as_i64(), Some(5));
}

#[test]
fn list_methods() {
    assert_eq!(eval("[1, 2, 3, 4].filter(fn(x) => x % 2 == 0)").to_string(), "[2, 4]");
    assert_eq!(eval("[1, 2, 3].reduce(fn(a, b) => a + b, 0)").as_i64(), Some(6));
    assert_eq!(eval(r#"["a", "b"].join("-")"#).as_str(), Some("a-b"));
}

#[test]
fn runaway_recursion_stops_at_call_depth() {
    let handle = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| {
            let omega = eval("fn(f) => f(f)");
            let result = eval_in("omega(omega)", MapScope::default().with("omega", omega));
            result.map(|value| value.to_string()).map_err(|err| err.to_string())
        })
        .unwrap();
    let err = handle.join().unwrap().unwrap_err();
    assert_eq!(err, "maximum call stack size exceeded");
}

// ══════════════════════════════════════════════════════════════════════
// Host scope and math
// ══════════════════════════════════════════════════════════════════════

#[test]
fn error_entries_raise_dependency_errors() {
    let mut map = TypedMap::new();
    map.insert("bad", TypedValue::error("runtime", "boom"));
    map.insert("good", TypedValue::Integer(1));
    let scope = MapScope::default().with("folder", TypedValue::mapping(map));
    let err = eval_in("folder.bad + 1", scope).unwrap_err();
    assert_eq!(err.to_string(), "error in dependency 'bad': boom");
}

#[test]
fn math_module() {
    assert_eq!(eval("math.floor(2.7)").as_i64(), Some(2));
    assert_eq!(eval("math.max(1, 5, 3)").as_i64(), Some(5));
    assert!(matches!(eval("math.sqrt(16)"), TypedValue::Float(x) if x == 4.0));
}
