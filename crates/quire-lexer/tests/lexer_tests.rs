//! Lexer tests for both dialects.
//!
//! Covers: keywords per dialect, operators, number literals (including
//! big integers), plain and interpolated strings, comments, spans, and
//! error recovery.

use quire_lexer::{Dialect, Lexer, NumberLit, TokenKind};
use quire_types::{ErrorCode, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds_in(dialect: Dialect, source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test", source);
    Lexer::new(&sf, dialect)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn formula(source: &str) -> Vec<TokenKind> {
    kinds_in(Dialect::Formula, source)
}

fn script(source: &str) -> Vec<TokenKind> {
    kinds_in(Dialect::Script, source)
}

/// Lex and return the error codes.
fn error_codes(dialect: Dialect, source: &str) -> Vec<ErrorCode> {
    let sf = SourceFile::new("test", source);
    Lexer::new(&sf, dialect)
        .lex()
        .errors
        .errors
        .iter()
        .map(|e| e.code)
        .collect()
}

fn first_error(dialect: Dialect, source: &str) -> String {
    let sf = SourceFile::new("test", source);
    Lexer::new(&sf, dialect)
        .lex()
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_default()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

fn int(value: i64) -> TokenKind {
    TokenKind::Number(NumberLit::Int(value))
}

// ═════════════════════════════════════════════════════════════════════
// Keywords
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_formula_keywords() {
    let pairs = [
        ("if", TokenKind::If),
        ("then", TokenKind::Then),
        ("else", TokenKind::Else),
        ("let", TokenKind::Let),
        ("in", TokenKind::In),
        ("fn", TokenKind::Fn),
        ("and", TokenKind::And),
        ("or", TokenKind::Or),
        ("not", TokenKind::Not),
        ("null", TokenKind::Null),
    ];
    for (src, expected) in &pairs {
        assert_eq!(formula(src), vec![expected.clone()], "keyword '{src}'");
    }
}

#[test]
fn test_script_words_are_identifiers_in_formulas() {
    assert_eq!(formula("function"), vec![ident("function")]);
    assert_eq!(formula("return"), vec![ident("return")]);
    assert_eq!(formula("const"), vec![ident("const")]);
}

#[test]
fn test_script_keywords() {
    let pairs = [
        ("const", TokenKind::Const),
        ("function", TokenKind::Function),
        ("return", TokenKind::Return),
        ("while", TokenKind::While),
        ("of", TokenKind::Of),
        ("undefined", TokenKind::Undefined),
        ("typeof", TokenKind::Typeof),
        ("delete", TokenKind::Delete),
    ];
    for (src, expected) in &pairs {
        assert_eq!(script(src), vec![expected.clone()], "keyword '{src}'");
    }
}

#[test]
fn test_formula_words_are_identifiers_in_scripts() {
    assert_eq!(script("then and fn"), vec![ident("then"), ident("and"), ident("fn")]);
}

#[test]
fn test_keywords_are_case_sensitive() {
    assert_eq!(formula("If"), vec![ident("If")]);
    assert_eq!(script("Return"), vec![ident("Return")]);
}

// ═════════════════════════════════════════════════════════════════════
// Identifiers
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_identifiers() {
    assert_eq!(
        formula("price _tmp x1 été"),
        vec![ident("price"), ident("_tmp"), ident("x1"), ident("été")]
    );
}

#[test]
fn test_dollar_identifier_only_in_script() {
    assert_eq!(script("$el"), vec![ident("$el")]);
    assert_eq!(
        error_codes(Dialect::Formula, "$el"),
        vec![ErrorCode::UNEXPECTED_CHARACTER]
    );
}

// ═════════════════════════════════════════════════════════════════════
// Numbers
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_integer_literals() {
    assert_eq!(formula("0 42 1000"), vec![int(0), int(42), int(1000)]);
}

#[test]
fn test_float_literals() {
    assert_eq!(
        formula("1.5 2e3 4.25E-2"),
        vec![
            TokenKind::Number(NumberLit::Float(1.5)),
            TokenKind::Number(NumberLit::Float(2000.0)),
            TokenKind::Number(NumberLit::Float(0.0425)),
        ]
    );
}

#[test]
fn test_integer_overflow_becomes_big() {
    assert_eq!(
        formula("123456789012345678901234567890"),
        vec![TokenKind::Number(NumberLit::Big(
            "123456789012345678901234567890".to_string()
        ))]
    );
}

#[test]
fn test_member_access_after_integer_is_not_a_fraction() {
    assert_eq!(
        formula("xs.0"),
        vec![ident("xs"), TokenKind::Dot, int(0)]
    );
    assert_eq!(
        formula("1.length"),
        vec![int(1), TokenKind::Dot, ident("length")]
    );
}

// ═════════════════════════════════════════════════════════════════════
// Operators
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_formula_operators() {
    assert_eq!(
        formula("+ - * / % == != < > <= >= ?? => ..."),
        vec![
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::QuestionQuestion,
            TokenKind::FatArrow,
            TokenKind::DotDotDot,
        ]
    );
}

#[test]
fn test_script_operators() {
    assert_eq!(
        script("=== !== ** && || ! ++ -- += -= *= /= ? :"),
        vec![
            TokenKind::EqEqEq,
            TokenKind::BangEqEq,
            TokenKind::StarStar,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::Bang,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::Question,
            TokenKind::Colon,
        ]
    );
}

#[test]
fn test_formula_rejects_symbolic_logic() {
    assert!(first_error(Dialect::Formula, "a && b").contains("and"));
    assert!(first_error(Dialect::Formula, "a || b").contains("or"));
    assert!(first_error(Dialect::Formula, "!a").contains("not"));
}

#[test]
fn test_formula_recovers_after_bad_operator() {
    // `&&` is reported and skipped, lexing continues
    assert_eq!(formula("a && b"), vec![ident("a"), ident("b")]);
}

#[test]
fn test_formula_splits_script_only_operators() {
    assert_eq!(formula("a ** b"), vec![ident("a"), TokenKind::Star, TokenKind::Star, ident("b")]);
}

// ═════════════════════════════════════════════════════════════════════
// Strings
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_plain_formula_string() {
    assert_eq!(
        formula(r#""hello world""#),
        vec![TokenKind::StringLiteral("hello world".to_string())]
    );
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        formula(r#""a\"b\n\t\\ \u{41}""#),
        vec![TokenKind::StringLiteral("a\"b\n\t\\ A".to_string())]
    );
}

#[test]
fn test_formula_interpolation() {
    assert_eq!(
        formula(r#""Hi ${name}!""#),
        vec![
            TokenKind::StringStart("Hi ".to_string()),
            TokenKind::InterpolationStart,
            ident("name"),
            TokenKind::InterpolationEnd,
            TokenKind::StringEnd("!".to_string()),
        ]
    );
}

#[test]
fn test_interpolation_with_nested_braces() {
    assert_eq!(
        formula(r#""${ {a: 1}.a } and ${b}""#),
        vec![
            TokenKind::StringStart(String::new()),
            TokenKind::InterpolationStart,
            TokenKind::LBrace,
            ident("a"),
            TokenKind::Colon,
            int(1),
            TokenKind::RBrace,
            TokenKind::Dot,
            ident("a"),
            TokenKind::InterpolationEnd,
            TokenKind::StringPart(" and ".to_string()),
            TokenKind::InterpolationStart,
            ident("b"),
            TokenKind::InterpolationEnd,
            TokenKind::StringEnd(String::new()),
        ]
    );
}

#[test]
fn test_script_quotes_do_not_interpolate() {
    assert_eq!(
        script(r#"'a${b}' "c${d}""#),
        vec![
            TokenKind::StringLiteral("a${b}".to_string()),
            TokenKind::StringLiteral("c${d}".to_string()),
        ]
    );
}

#[test]
fn test_script_template_literal() {
    assert_eq!(
        script("`x=${x}\ny`"),
        vec![
            TokenKind::StringStart("x=".to_string()),
            TokenKind::InterpolationStart,
            ident("x"),
            TokenKind::InterpolationEnd,
            TokenKind::StringEnd("\ny".to_string()),
        ]
    );
}

#[test]
fn test_single_quotes_rejected_in_formula() {
    assert_eq!(
        error_codes(Dialect::Formula, "'a'").first(),
        Some(&ErrorCode::UNEXPECTED_CHARACTER)
    );
}

#[test]
fn test_unterminated_string() {
    assert_eq!(
        error_codes(Dialect::Formula, r#""abc"#),
        vec![ErrorCode::UNTERMINATED_STRING]
    );
    assert_eq!(
        error_codes(Dialect::Script, "'abc\n'"),
        vec![ErrorCode::UNTERMINATED_STRING, ErrorCode::UNTERMINATED_STRING]
    );
}

#[test]
fn test_unterminated_interpolation() {
    assert!(error_codes(Dialect::Formula, r#""a ${b"#).contains(&ErrorCode::UNTERMINATED_STRING));
}

#[test]
fn test_invalid_escape() {
    assert_eq!(
        error_codes(Dialect::Formula, r#""\q""#),
        vec![ErrorCode::INVALID_ESCAPE]
    );
}

// ═════════════════════════════════════════════════════════════════════
// Comments & whitespace
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        script("a // trailing\n/* block\n comment */ b"),
        vec![ident("a"), ident("b")]
    );
}

#[test]
fn test_unterminated_block_comment() {
    assert_eq!(
        error_codes(Dialect::Script, "a /* open"),
        vec![ErrorCode::UNTERMINATED_COMMENT]
    );
}

#[test]
fn test_newlines_are_whitespace() {
    assert_eq!(formula("1\n+\n2"), vec![int(1), TokenKind::Plus, int(2)]);
}

// ═════════════════════════════════════════════════════════════════════
// Spans
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_spans_track_lines_and_columns() {
    let sf = SourceFile::new("test", "a +\n  bc");
    let tokens = Lexer::new(&sf, Dialect::Formula).lex().tokens;
    let bc = &tokens[2];
    assert_eq!(bc.kind, ident("bc"));
    assert_eq!((bc.span.start, bc.span.end), (6, 8));
    assert_eq!((bc.span.line, bc.span.col), (2, 3));
}

#[test]
fn test_columns_count_characters() {
    let sf = SourceFile::new("test", "\"é\" + x");
    let tokens = Lexer::new(&sf, Dialect::Formula).lex().tokens;
    let x = &tokens[2];
    assert_eq!(x.kind, ident("x"));
    assert_eq!(x.span.col, 7);
    assert_eq!(x.span.start, 7);
}

#[test]
fn test_always_ends_with_eof() {
    let sf = SourceFile::new("test", "");
    let tokens = Lexer::new(&sf, Dialect::Script).lex().tokens;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn test_error_cap() {
    let source = "#".repeat(50);
    let sf = SourceFile::new("test", source);
    let result = Lexer::new(&sf, Dialect::Formula).lex();
    assert!(result.errors.is_full());
    assert_eq!(result.errors.errors.len(), 20);
}
