//! Renders an [`Error`] against the source it was raised for.
//!
//! The offending stretch of the line is shown in reverse video, followed by
//! the error message:
//!
//! ```text
//! ;! (display "Hello world)
//! ;! Unclosed string
//! ```

use crate::ast::Span;
use crate::{Error, Subject};

const PREFIX: &str = ";! ";
const REVERSE_VIDEO: &str = "\x1b[7m";
const RESET: &str = "\x1b[m";

/// Render `error` as two `;!`-prefixed lines. `lines` holds the session's
/// source text split on newlines, indexed by the line numbers in spans.
pub fn render(error: &Error, lines: &[&str]) -> String {
    let message = match &error.detail {
        Some(detail) => format!("{}: {detail}", error.kind),
        None => error.kind.to_string(),
    };

    let source = match error.span() {
        Some(span) => highlight(span, lines).unwrap_or_else(|| subject_text(&error.subject)),
        None => subject_text(&error.subject),
    };

    format!("{PREFIX}{source}\n{PREFIX}{message}")
}

fn subject_text(subject: &Subject) -> String {
    match subject {
        Subject::Text(span) => span.to_string(),
        Subject::Value(value) => value.to_string(),
    }
}

/// The span's first line with the spanned columns highlighted. A span that
/// runs past its first line is highlighted to the end of that line.
fn highlight(span: &Span, lines: &[&str]) -> Option<String> {
    let line = lines.get(span.begin.line)?;
    let chars: Vec<char> = line.chars().collect();

    let begin = span.begin.column.min(chars.len());
    let end = if span.end.line == span.begin.line {
        span.end.column.clamp(begin, chars.len())
    } else {
        chars.len()
    };

    let before: String = chars[..begin].iter().collect();
    let marked: String = chars[begin..end].iter().collect();
    let after: String = chars[end..].iter().collect();
    Some(format!("{before}{REVERSE_VIDEO}{marked}{RESET}{after}"))
}
