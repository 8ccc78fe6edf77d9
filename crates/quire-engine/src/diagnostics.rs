//! Source-location mapping for parser errors.

use quire_types::{ErrorContext, ErrorDetail, ErrorKind, SourceFile, SourceLocation, Span, SyntaxErrors};

/// Widest context snippet, in characters.
const CONTEXT_WIDTH: usize = 80;

/// Resolve `span` to a location and a clipped line with a caret underline.
pub fn locate(file: &SourceFile, span: Span) -> (SourceLocation, ErrorContext) {
    let location = SourceLocation {
        index: span.start as usize,
        line: span.line,
        column: span.col,
        length: span.len() as usize,
    };

    let chars: Vec<char> = file.line(span.line).unwrap_or("").chars().collect();
    let column = (span.col.max(1) as usize - 1).min(chars.len());
    let start = if chars.len() <= CONTEXT_WIDTH {
        0
    } else {
        column.saturating_sub(CONTEXT_WIDTH / 2).min(chars.len() - CONTEXT_WIDTH)
    };
    let end = (start + CONTEXT_WIDTH).min(chars.len());

    let span_chars = file
        .source
        .get(span.start as usize..span.end as usize)
        .map_or(0, |text| text.chars().count());
    let carets = span_chars.min(end.saturating_sub(column)).max(1);

    let context = ErrorContext {
        line_text: chars[start..end].iter().collect(),
        underline: format!("{}{}", " ".repeat(column - start), "^".repeat(carets)),
    };
    (location, context)
}

/// One parser detail per syntax error, in source order.
pub fn syntax_details(errors: &SyntaxErrors, file: &SourceFile) -> Vec<ErrorDetail> {
    errors
        .errors
        .iter()
        .map(|error| {
            let (location, context) = locate(file, error.span);
            ErrorDetail::new(ErrorKind::Parser, error.message.clone()).with_location(location, context)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caret_under_column() {
        let file = SourceFile::new("f", "1 +\n  2 * )");
        let span = file.span(10, 11);
        let (location, context) = locate(&file, span);
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 7);
        assert_eq!(location.length, 1);
        assert_eq!(context.to_string(), "  2 * )\n      ^");
    }

    #[test]
    fn test_zero_width_span_gets_one_caret() {
        let file = SourceFile::new("f", "abc");
        let (_, context) = locate(&file, file.span(3, 3));
        assert_eq!(context.underline, "   ^");
    }

    #[test]
    fn test_long_lines_are_clipped_around_the_column() {
        let line = format!("{}X{}", "a".repeat(100), "b".repeat(100));
        let file = SourceFile::new("f", line.as_str());
        let (_, context) = locate(&file, file.span(100, 101));
        assert_eq!(context.line_text.chars().count(), CONTEXT_WIDTH);
        let caret = context.underline.find('^').unwrap_or(0);
        assert_eq!(context.line_text.chars().nth(caret), Some('X'));
    }
}
