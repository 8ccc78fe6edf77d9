//! Integration tests for the script interpreter.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use quire_eval::{run_script, EvalError, Globals, HostScope, ScriptError, ScriptOptions};
use quire_parser::parse_script;
use quire_types::SourceFile;
use quire_value::{NativeValue, ValueError, ValueResult};

// ══════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════

fn run_with(source: &str, host: Rc<dyn HostScope>) -> Result<NativeValue, ScriptError> {
    let sf = SourceFile::new("test.js", source);
    let script = match parse_script(&sf).into_result() {
        Ok(script) => script,
        Err(errors) => panic!("parse errors: {:?}", errors.errors),
    };
    run_script(&script, host, &ScriptOptions::new("main"))
}

fn run(source: &str) -> NativeValue {
    run_with(source, Rc::new(Globals::new())).unwrap()
}

fn run_err(source: &str) -> ScriptError {
    run_with(source, Rc::new(Globals::new())).unwrap_err()
}

fn number(source: &str) -> f64 {
    run(source).as_number().unwrap()
}

/// A host whose `cyclic` binding fails the way an engine cycle does.
struct CyclicHost;

impl HostScope for CyclicHost {
    fn has(&self, name: &str) -> bool {
        name == "cyclic"
    }

    fn get(&self, name: &str) -> ValueResult<Option<NativeValue>> {
        if name == "cyclic" {
            return Err(ValueError::engine("circular reference detected: cyclic"));
        }
        Ok(None)
    }
}

// ══════════════════════════════════════════════════════════════════════
// Results
// ══════════════════════════════════════════════════════════════════════

#[test]
fn top_level_return_is_the_result() {
    assert_eq!(number("return 1 + 2 * 3"), 7.0);
}

#[test]
fn falling_off_the_end_yields_null() {
    assert!(matches!(run("let x = 1; x + 1"), NativeValue::Null));
}

#[test]
fn template_and_string_methods() {
    let value = run("const name = 'quire'; return `${name.toUpperCase()}!`");
    assert_eq!(value.as_str(), Some("QUIRE!"));
    assert_eq!(run("return 'a,b,c'.split(',').join('+')").as_str(), Some("a+b+c"));
}

// ══════════════════════════════════════════════════════════════════════
// Control flow and scoping
// ══════════════════════════════════════════════════════════════════════

#[test]
fn loops_with_break_and_continue() {
    let source = "let s = 0
        for (let i = 0; i < 10; i++) {
            if (i == 2) continue
            if (i == 5) break
            s += i
        }
        return s";
    assert_eq!(number(source), 8.0);
    assert_eq!(number("let n = 0\nwhile (n < 3) { n = n + 1 }\nreturn n"), 3.0);
}

#[test]
fn for_of_walks_arrays_and_strings() {
    assert_eq!(number("let t = 0\nfor (const x of [1, 2, 3]) { t += x }\nreturn t"), 6.0);
    assert_eq!(run("let out = ''\nfor (const c of 'abc') { out = c + out }\nreturn out").as_str(), Some("cba"));
}

#[test]
fn closures_share_their_scope() {
    let source = "function counter() {
            let n = 0
            return () => { n += 1; return n }
        }
        const next = counter()
        next()
        next()
        return next()";
    assert_eq!(number(source), 3.0);
}

#[test]
fn function_declarations_are_hoisted() {
    assert_eq!(number("return twice(4)\nfunction twice(x) { return x * 2 }"), 8.0);
}

#[test]
fn const_cannot_be_reassigned() {
    let err = run_err("const a = 1\na = 2");
    assert_eq!(err.error, EvalError::ConstAssignment("a".to_string()));
}

#[test]
fn redeclaration_fails() {
    let err = run_err("let a = 1\nlet a = 2");
    assert_eq!(err.to_string(), "'a' has already been declared");
}

// ══════════════════════════════════════════════════════════════════════
// Built-ins
// ══════════════════════════════════════════════════════════════════════

#[test]
fn array_methods() {
    assert_eq!(run("return [1, 2, 3].map((x) => x * 2)").to_string(), "2,4,6");
    assert_eq!(number("return [1, 2, 3, 4].filter((x) => x % 2 == 0).reduce((a, b) => a + b, 0)"), 6.0);
    assert_eq!(run("return [3, 1, 10].sort()").to_string(), "1,10,3");
    assert_eq!(run("return [3, 1, 10].sort((a, b) => a - b)").to_string(), "1,3,10");
    assert_eq!(number("const xs = [1]; xs.push(2, 3); return xs.length"), 3.0);
}

#[test]
fn object_spread_and_json() {
    let source = "const a = { x: 1 }
        const b = { ...a, y: [true, null] }
        return JSON.stringify(b)";
    assert_eq!(run(source).as_str(), Some(r#"{"x":1,"y":[true,null]}"#));
}

#[test]
fn methods_stored_on_objects_are_callable() {
    assert_eq!(number("const o = { f: (x) => x * 2 }; return o.f(4)"), 8.0);
}

#[test]
fn typeof_unknown_name_is_undefined() {
    assert_eq!(run("return typeof nothing").as_str(), Some("undefined"));
    assert_eq!(run("return typeof Math").as_str(), Some("object"));
}

#[test]
fn calling_a_non_function_fails() {
    let err = run_err("const x = 3\nreturn x()");
    assert_eq!(err.to_string(), "type mismatch: x is not a function");
}

// ══════════════════════════════════════════════════════════════════════
// Host bindings
// ══════════════════════════════════════════════════════════════════════

#[test]
fn host_bindings_are_readable() {
    let host = Rc::new(Globals::new().with("width", NativeValue::Number(3.0)));
    let value = run_with("return width * 2", host).unwrap();
    assert_eq!(value.as_number(), Some(6.0));
}

#[test]
fn host_bindings_are_read_only() {
    let host = Rc::new(Globals::new().with("width", NativeValue::Number(3.0)));
    let err = run_with("width = 4", host.clone()).unwrap_err();
    assert_eq!(err.error, EvalError::ReadOnly("width".to_string()));
    let err = run_with("delete width", host).unwrap_err();
    assert_eq!(err.to_string(), "cannot modify 'width': engine bindings are read-only");
    assert!(matches!(run_err("undeclared = 1").error, EvalError::ReadOnly(_)));
}

#[test]
fn engine_failures_keep_their_kind() {
    let err = run_with("return cyclic + 1", Rc::new(CyclicHost)).unwrap_err();
    assert!(err.is_engine());
    assert_eq!(err.to_string(), "circular reference detected: cyclic");
}

// ══════════════════════════════════════════════════════════════════════
// Errors and stack traces
// ══════════════════════════════════════════════════════════════════════

#[test]
fn thrown_values_carry_a_stack_trace() {
    let source = "function inner() {
  throw 'bad input'
}
function outer() {
  return inner()
}
return outer()";
    let err = run_err(source);
    assert_eq!(err.error, EvalError::Thrown("bad input".to_string()));
    assert_eq!(
        err.trace().as_deref(),
        Some("at inner (2:3)\nat outer (5:3)\nat main (7:1)")
    );
}

#[test]
fn anonymous_functions_take_their_binding_name() {
    let err = run_err("const check = () => {\n  throw { message: 'nope' }\n}\ncheck()");
    assert_eq!(err.to_string(), "uncaught nope");
    let trace = err.trace().unwrap_or_default();
    assert!(trace.starts_with("at check (2:3)"), "{trace}");
}

#[test]
fn runaway_recursion_stops_at_call_depth() {
    let handle = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| {
            let err = run_err("function f(n) { return f(n + 1) }\nreturn f(0)");
            (err.to_string(), err.stack.len())
        })
        .unwrap();
    let (message, frames) = handle.join().unwrap();
    assert_eq!(message, "maximum call stack size exceeded");
    assert!(frames > 1);
}

#[test]
fn oversized_strings_fail_with_a_runtime_error() {
    assert_eq!(run("return 'ab'.repeat(3)").as_str(), Some("ababab"));
    assert_eq!(run("return ''.repeat(1e19)").as_str(), Some(""));
    assert_eq!(run_err("return 'ab'.repeat(1e19)").to_string(), "invalid string length");
    assert_eq!(run_err("return 'x'.padStart(1e12, '-')").to_string(), "invalid string length");
    assert_eq!(run("return '7'.padStart(3, '0')").as_str(), Some("007"));
}

#[test]
fn oversized_arrays_fail_with_a_runtime_error() {
    assert_eq!(run_err("const a = []\na.length = 1e12").to_string(), "invalid array length");
    assert_eq!(run_err("const a = []\na[4000000000] = 1").to_string(), "invalid array length");
    assert_eq!(number("const a = [1]\na[3] = 4\nreturn a.length"), 4.0);
}

#[test]
fn frozen_host_values_reject_mutation() {
    let shared = NativeValue::array(vec![NativeValue::Number(1.0), NativeValue::Number(2.0)]);
    shared.freeze();
    let host: Rc<dyn HostScope> = Rc::new(Globals::new().with("shared", shared));
    for source in ["shared.push(3)", "shared[0] = 9", "shared.sort()", "delete shared[0]"] {
        let err = run_with(source, host.clone()).unwrap_err();
        assert_eq!(err.to_string(), "cannot modify a read-only value", "{source}");
    }
    let copy = run_with("const c = shared.map(x => x * 10)\nc.push(3)\nreturn c.length", host).unwrap();
    assert_eq!(copy.as_number(), Some(3.0));
}
