//! Error reporting and recovery tests for both parsers.

use quire_parser::{parse_formula, parse_script};
use quire_types::{ErrorCode, SourceFile};

fn formula_errors(source: &str) -> Vec<ErrorCode> {
    let sf = SourceFile::new("test.fx", source);
    parse_formula(&sf).errors.errors.iter().map(|e| e.code).collect()
}

fn script_errors(source: &str) -> Vec<ErrorCode> {
    let sf = SourceFile::new("test.js", source);
    parse_script(&sf).errors.errors.iter().map(|e| e.code).collect()
}

// ═════════════════════════════════════════════════════════════════════
// Formula errors
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_chained_comparison_rejected() {
    assert_eq!(formula_errors("a < b < c"), vec![ErrorCode::CHAINED_COMPARISON]);
}

#[test]
fn test_trailing_input() {
    assert_eq!(formula_errors("1 2"), vec![ErrorCode::TRAILING_INPUT]);
}

#[test]
fn test_missing_operand() {
    assert_eq!(formula_errors("1 +"), vec![ErrorCode::EXPECTED_EXPRESSION]);
}

#[test]
fn test_unclosed_paren() {
    assert_eq!(formula_errors("(1 + 2"), vec![ErrorCode::UNCLOSED_DELIMITER]);
}

#[test]
fn test_if_requires_else() {
    let codes = formula_errors("if a then b");
    assert_eq!(codes.len(), 1);
}

#[test]
fn test_lexer_errors_come_first() {
    let codes = formula_errors("a && b");
    assert_eq!(codes.first(), Some(&ErrorCode::UNEXPECTED_CHARACTER));
}

#[test]
fn test_error_position_on_second_line() {
    let sf = SourceFile::new("test.fx", "1 +\n  * 2");
    let result = parse_formula(&sf);
    let err = result.errors.first().expect("an error");
    assert_eq!(err.span.line, 2);
    assert_eq!(err.span.col, 3);
    assert_eq!(err.span.start, 6);
    assert_eq!(err.source_line, "  * 2");
}

#[test]
fn test_deep_nesting_is_limited() {
    let source = format!("{}1{}", "(".repeat(300), ")".repeat(300));
    assert!(formula_errors(&source).contains(&ErrorCode::NESTING_LIMIT_EXCEEDED));
}

#[test]
fn test_into_result() {
    let sf = SourceFile::new("test.fx", "1 +");
    assert!(parse_formula(&sf).into_result().is_err());
    let sf = SourceFile::new("test.fx", "1 + 1");
    assert!(parse_formula(&sf).into_result().is_ok());
}

// ═════════════════════════════════════════════════════════════════════
// Script errors
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_break_outside_loop() {
    assert_eq!(script_errors("break"), vec![ErrorCode::MISPLACED_CONTROL_FLOW]);
    assert_eq!(
        script_errors("while (true) { const f = () => { break } }"),
        vec![ErrorCode::MISPLACED_CONTROL_FLOW]
    );
}

#[test]
fn test_invalid_assignment_target() {
    assert_eq!(script_errors("1 = 2"), vec![ErrorCode::INVALID_ASSIGNMENT_TARGET]);
    assert_eq!(script_errors("(a + b)++"), vec![ErrorCode::INVALID_ASSIGNMENT_TARGET]);
}

#[test]
fn test_const_requires_initializer() {
    assert_eq!(script_errors("const a"), vec![ErrorCode::EXPECTED_EXPRESSION]);
}

#[test]
fn test_statements_on_one_line_need_semicolon() {
    assert_eq!(script_errors("let a = 1 let b = 2"), vec![ErrorCode::UNEXPECTED_TOKEN]);
    assert!(script_errors("let a = 1; let b = 2").is_empty());
}

#[test]
fn test_recovery_continues_after_bad_statement() {
    let sf = SourceFile::new("test.js", "let = 1;\nlet ok = 2;\nreturn ok");
    let result = parse_script(&sf);
    assert_eq!(result.errors.total_errors, 1);
    let script = result.program.expect("script");
    assert_eq!(script.body.len(), 2);
}

#[test]
fn test_stray_closing_brace() {
    assert_eq!(script_errors("}"), vec![ErrorCode::UNEXPECTED_TOKEN]);
}

#[test]
fn test_formula_keywords_are_plain_names_in_scripts() {
    assert!(script_errors("const then = 1; return then").is_empty());
}
