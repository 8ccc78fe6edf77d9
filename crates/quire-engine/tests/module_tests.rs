//! Integration tests for `import`.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use quire_engine::{evaluate, EvaluateOptions, EvaluationResult, MemoryResolver, ModuleRegistry, Session};
use quire_types::ErrorKind;

fn session_with(root: MemoryResolver, modules: ModuleRegistry) -> Session {
    evaluate(Rc::new(root), Some(1.0), EvaluateOptions::new().with_modules(modules))
}

fn result(session: &Session, path: &str) -> Rc<EvaluationResult> {
    match session.evaluate_expression(path) {
        Some(result) => result,
        None => panic!("no expression at '{path}'"),
    }
}

fn int(session: &Session, path: &str) -> i64 {
    let result = result(session, path);
    match result.typed().and_then(|v| v.as_i64()) {
        Some(i) => i,
        None => panic!("'{path}' is not an integer: {:?}", result),
    }
}

fn geometry() -> MemoryResolver {
    MemoryResolver::new()
        .formula("unit", "1")
        .formula("shapes/square", "{ side: unit * 4 }")
}

// ══════════════════════════════════════════════════════════════════════
// Registered modules
// ══════════════════════════════════════════════════════════════════════

#[test]
fn formula_imports_a_module_mapping() {
    let root = MemoryResolver::new().formula("side", r#"import("geometry").shapes.square.side"#);
    let session = session_with(root, ModuleRegistry::new().with("geometry", geometry()));
    assert_eq!(int(&session, "side"), 4);
}

#[test]
fn script_imports_a_module() {
    let root = MemoryResolver::new().script("twice", "const g = import('geometry')\nreturn g.unit * 2");
    let session = session_with(root, ModuleRegistry::new().with("geometry", geometry()));
    assert_eq!(int(&session, "twice"), 2);
}

#[test]
fn module_return_member_is_the_module_value() {
    let module = MemoryResolver::new().formula("return", "40").formula("hidden", "0");
    let root = MemoryResolver::new().formula("answer", r#"import("answer") + 2"#);
    let session = session_with(root, ModuleRegistry::new().with("answer", module));
    assert_eq!(int(&session, "answer"), 42);
}

#[test]
fn unknown_module_is_an_engine_error() {
    let root = MemoryResolver::new().formula("x", r#"import("nowhere")"#);
    let session = session_with(root, ModuleRegistry::new());
    let x = result(&session, "x");
    assert_eq!(x.error_kind(), Some(ErrorKind::Engine));
    assert_eq!(x.error(), Some("module not found: 'nowhere'"));
}

#[test]
fn import_cycles_are_detected() {
    let a = MemoryResolver::new().formula("return", r#"import("b")"#);
    let b = MemoryResolver::new().formula("return", r#"import("a")"#);
    let root = MemoryResolver::new().formula("x", r#"import("a")"#);
    let session = session_with(root, ModuleRegistry::new().with("a", a).with("b", b));
    let x = result(&session, "x");
    assert_eq!(x.error_kind(), Some(ErrorKind::Engine));
    assert_eq!(x.error(), Some("circular import: 'a'"));
}

#[test]
fn modules_follow_the_session_time() {
    let clock = MemoryResolver::new().formula("now", "t * 10");
    let root = MemoryResolver::new().formula("now", r#"import("clock").now"#);
    let mut session = session_with(root, ModuleRegistry::new().with("clock", clock));
    assert_eq!(int(&session, "now"), 10);
    session.set_time(2.0);
    assert_eq!(int(&session, "now"), 20);
}

// ══════════════════════════════════════════════════════════════════════
// Relative imports
// ══════════════════════════════════════════════════════════════════════

#[test]
fn relative_imports_resolve_against_the_calling_folder() {
    let root = MemoryResolver::new()
        .formula("shapes/circle", "{ r: 1 }")
        .formula("shapes/big", r#"import("./circle").r * 10"#)
        .formula("shapes/inner/again", r#"import("../circle.fx").r"#);
    let session = session_with(root, ModuleRegistry::new());
    assert_eq!(int(&session, "shapes/big"), 10);
    assert_eq!(int(&session, "shapes/inner/again"), 1);
}

#[test]
fn relative_imports_inside_a_module_stay_in_the_module() {
    let module = MemoryResolver::new()
        .formula("base", "5")
        .formula("lib/value", r#"import("../base") * 2"#);
    let root = MemoryResolver::new()
        .formula("base", "100")
        .formula("x", r#"import("pkg").lib.value"#);
    let session = session_with(root, ModuleRegistry::new().with("pkg", module));
    assert_eq!(int(&session, "x"), 10);
}

#[test]
fn relative_import_of_a_missing_path_fails() {
    let root = MemoryResolver::new()
        .formula("up", r#"import("../outside")"#)
        .formula("gone", r#"import("./nothing")"#);
    let session = session_with(root, ModuleRegistry::new());
    assert_eq!(result(&session, "up").error(), Some("module not found: '../outside'"));
    assert_eq!(result(&session, "gone").error_kind(), Some(ErrorKind::Engine));
}
