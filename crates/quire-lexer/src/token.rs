//! Token types for the Quire lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of both dialects and
//! [`Token`], which pairs a kind with a source [`Span`].

use quire_types::Span;
use std::fmt;

/// Which language a source text is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Declarative single-expression language.
    Formula,
    /// Imperative statement language.
    Script,
}

/// Reserved words of the formula dialect.
pub const FORMULA_KEYWORDS: &[&str] = &[
    "true", "false", "null", "and", "or", "not", "if", "then", "else", "let", "in", "fn",
];

/// Reserved words of the script dialect.
pub const SCRIPT_KEYWORDS: &[&str] = &[
    "true", "false", "null", "undefined", "let", "const", "function", "return", "if", "else",
    "while", "for", "of", "break", "continue", "throw", "typeof", "delete",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Source location.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns `true` if this token is a reserved keyword.
    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

/// A numeric literal as written.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberLit {
    /// Integer literal that fits in 64 bits.
    Int(i64),
    /// Integer literal that does not fit in 64 bits (decimal digits).
    Big(String),
    /// Literal with a fraction or exponent.
    Float(f64),
}

impl NumberLit {
    /// The literal as a double, the only numeric type scripts know.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Big(digits) => digits.parse().unwrap_or(f64::INFINITY),
            Self::Float(f) => *f,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

/// Every token kind in either dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────

    /// Numeric literal: `42`, `3.14`, `1e3`
    Number(NumberLit),
    /// Complete string literal with no interpolation: `"hello"`
    StringLiteral(String),

    // ── String Interpolation ─────────────────────────────────

    /// Start of an interpolated string: text before the first `${`.
    StringStart(String),
    /// Text between a `}` and the next `${` inside an interpolated string.
    StringPart(String),
    /// End of an interpolated string: text after the last `}` to the quote.
    StringEnd(String),
    /// The `${` that opens an interpolation expression.
    InterpolationStart,
    /// The `}` that closes an interpolation expression.
    InterpolationEnd,

    // ── Identifiers ──────────────────────────────────────────

    /// User-defined identifier: `width`, `$el`, `point_2`
    Identifier(String),

    // ── Keywords (shared) ────────────────────────────────────

    True,
    False,
    Null,
    If,
    Else,
    Let,

    // ── Formula keywords ─────────────────────────────────────

    And,
    Or,
    Not,
    Then,
    In,
    Fn,

    // ── Script keywords ──────────────────────────────────────

    Undefined,
    Const,
    Function,
    Return,
    While,
    For,
    Of,
    Break,
    Continue,
    Throw,
    Typeof,
    Delete,

    // ── Operators ────────────────────────────────────────────

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    /// `===`
    EqEqEq,
    /// `!==`
    BangEqEq,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `!`
    Bang,
    /// `??`
    QuestionQuestion,
    /// `?` (ternary)
    Question,
    /// `=`
    Eq,
    /// `+=`
    PlusEq,
    /// `-=`
    MinusEq,
    /// `*=`
    StarEq,
    /// `/=`
    SlashEq,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `=>`
    FatArrow,
    /// `...` (spread)
    DotDotDot,

    // ── Punctuation ──────────────────────────────────────────

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,

    // ── Special ──────────────────────────────────────────────

    /// End of input
    Eof,
}

impl TokenKind {
    /// Look up a reserved identifier for the given dialect. Returns `None`
    /// for user identifiers (including the other dialect's keywords).
    pub fn from_keyword(dialect: Dialect, s: &str) -> Option<TokenKind> {
        let shared = match s {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "let" => Some(TokenKind::Let),
            _ => None,
        };
        if shared.is_some() {
            return shared;
        }
        match dialect {
            Dialect::Formula => Some(match s {
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                "then" => TokenKind::Then,
                "in" => TokenKind::In,
                "fn" => TokenKind::Fn,
                _ => return None,
            }),
            Dialect::Script => Some(match s {
                "undefined" => TokenKind::Undefined,
                "const" => TokenKind::Const,
                "function" => TokenKind::Function,
                "return" => TokenKind::Return,
                "while" => TokenKind::While,
                "for" => TokenKind::For,
                "of" => TokenKind::Of,
                "break" => TokenKind::Break,
                "continue" => TokenKind::Continue,
                "throw" => TokenKind::Throw,
                "typeof" => TokenKind::Typeof,
                "delete" => TokenKind::Delete,
                _ => return None,
            }),
        }
    }

    /// Returns `true` if this token kind is a reserved keyword of either dialect.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::Let
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::Then
                | TokenKind::In
                | TokenKind::Fn
                | TokenKind::Undefined
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::Return
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Of
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Throw
                | TokenKind::Typeof
                | TokenKind::Delete
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(NumberLit::Int(n)) => write!(f, "{n}"),
            TokenKind::Number(NumberLit::Big(digits)) => write!(f, "{digits}"),
            TokenKind::Number(NumberLit::Float(n)) => write!(f, "{n}"),
            TokenKind::StringLiteral(s) => write!(f, "\"{s}\""),
            TokenKind::StringStart(s) => write!(f, "\"{s}${{"),
            TokenKind::StringPart(s) => write!(f, "}}{s}${{"),
            TokenKind::StringEnd(s) => write!(f, "}}{s}\""),
            TokenKind::InterpolationStart => write!(f, "${{"),
            TokenKind::InterpolationEnd => write!(f, "}}"),
            TokenKind::Identifier(name) => write!(f, "{name}"),

            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Let => write!(f, "let"),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Then => write!(f, "then"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Fn => write!(f, "fn"),
            TokenKind::Undefined => write!(f, "undefined"),
            TokenKind::Const => write!(f, "const"),
            TokenKind::Function => write!(f, "function"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::While => write!(f, "while"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Of => write!(f, "of"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Throw => write!(f, "throw"),
            TokenKind::Typeof => write!(f, "typeof"),
            TokenKind::Delete => write!(f, "delete"),

            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StarStar => write!(f, "**"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::BangEq => write!(f, "!="),
            TokenKind::EqEqEq => write!(f, "==="),
            TokenKind::BangEqEq => write!(f, "!=="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::LessEq => write!(f, "<="),
            TokenKind::GreaterEq => write!(f, ">="),
            TokenKind::AmpAmp => write!(f, "&&"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::QuestionQuestion => write!(f, "??"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::PlusEq => write!(f, "+="),
            TokenKind::MinusEq => write!(f, "-="),
            TokenKind::StarEq => write!(f, "*="),
            TokenKind::SlashEq => write!(f, "/="),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::MinusMinus => write!(f, "--"),
            TokenKind::FatArrow => write!(f, "=>"),
            TokenKind::DotDotDot => write!(f, "..."),

            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Dot => write!(f, "."),

            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_formula_keyword_resolves() {
        for kw in FORMULA_KEYWORDS {
            let kind = TokenKind::from_keyword(Dialect::Formula, kw)
                .unwrap_or_else(|| panic!("'{kw}' should be a formula keyword"));
            assert!(kind.is_keyword());
            assert_eq!(kind.to_string(), *kw);
        }
    }

    #[test]
    fn test_every_script_keyword_resolves() {
        for kw in SCRIPT_KEYWORDS {
            let kind = TokenKind::from_keyword(Dialect::Script, kw)
                .unwrap_or_else(|| panic!("'{kw}' should be a script keyword"));
            assert!(kind.is_keyword());
            assert_eq!(kind.to_string(), *kw);
        }
    }

    #[test]
    fn test_keywords_are_dialect_specific() {
        assert_eq!(TokenKind::from_keyword(Dialect::Script, "and"), None);
        assert_eq!(TokenKind::from_keyword(Dialect::Formula, "function"), None);
        assert_eq!(TokenKind::from_keyword(Dialect::Formula, "width"), None);
    }

    #[test]
    fn test_number_lit_as_f64() {
        assert_eq!(NumberLit::Int(3).as_f64(), 3.0);
        assert_eq!(NumberLit::Float(2.5).as_f64(), 2.5);
        assert_eq!(NumberLit::Big("100000000000000000000".into()).as_f64(), 1e20);
    }
}
