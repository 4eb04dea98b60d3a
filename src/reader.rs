//! Reader: source text to [`Value`] trees with source spans.
//!
//! Lexical rules: tokens are separated by whitespace (space, tab, CR, LF,
//! form feed) and parentheses; `;` starts a comment running to the end of the
//! line; `'x` is shorthand for `(quote x)`; `#t`/`#f` (either case) are
//! booleans and `#!word` is a pragma; tokens starting with a digit (after an
//! optional sign) must be decimal integers.

use std::rc::Rc;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::{not, value},
    error::{ErrorKind as NomErrorKind, ParseError},
    multi::{many0, many0_count},
    sequence::{preceded, terminated},
};

use crate::ast::{Position, Span, Value, ValueKind};
use crate::{Error, ErrorKind, MAX_PARSE_DEPTH};

/// Reader configuration
#[derive(Debug, Clone, Default)]
pub struct ReadConfig {
    /// Cursor of the first character of the text. A REPL feeding one line at
    /// a time passes the line number here so spans index its line history.
    pub start: Position,
    /// File name stamped on every span
    pub file: Option<Rc<str>>,
}

impl ReadConfig {
    pub fn at_line(line: usize) -> Self {
        ReadConfig {
            start: Position::new(0, line),
            file: None,
        }
    }
}

/// Read every top-level datum in `text`
pub fn read(text: &str) -> Result<Vec<Value>, Error> {
    read_with_config(text, &ReadConfig::default())
}

/// Read every top-level datum in `text`, positioned per `config`
pub fn read_with_config(text: &str, config: &ReadConfig) -> Result<Vec<Value>, Error> {
    Reader::new(text, config).read_all()
}

/// Internal nom error type
#[derive(Debug)]
enum Failure<'s> {
    /// No datum starts here; lets `alt` and `many0` try something else
    Mismatch(&'s str),
    /// A definite read error covering the text between two suffixes of the input
    Fatal {
        kind: ErrorKind,
        from: &'s str,
        to: &'s str,
    },
}

impl<'s> ParseError<&'s str> for Failure<'s> {
    fn from_error_kind(input: &'s str, _kind: NomErrorKind) -> Self {
        Failure::Mismatch(input)
    }

    fn append(_input: &'s str, _kind: NomErrorKind, other: Self) -> Self {
        other
    }
}

type ReadResult<'s, T> = IResult<&'s str, T, Failure<'s>>;

fn fatal<'s, T>(kind: ErrorKind, from: &'s str, to: &'s str) -> ReadResult<'s, T> {
    Err(nom::Err::Failure(Failure::Fatal { kind, from, to }))
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\x0c')
}

fn is_separator(c: char) -> bool {
    is_whitespace(c) || c == '(' || c == ')'
}

/// Whitespace and comments
fn atmosphere(input: &str) -> ReadResult<'_, ()> {
    value(
        (),
        many0_count(alt((
            take_while1(is_whitespace),
            preceded(char(';'), take_while(|c| c != '\n' && c != '\r')),
        ))),
    )
    .parse(input)
}

/// Everything up to the next separator
fn token(input: &str) -> ReadResult<'_, &str> {
    take_while1(|c| !is_separator(c)).parse(input)
}

/// `[+-]?digit...`
fn looks_numeric(token: &str) -> bool {
    let unsigned = token.strip_prefix(['+', '-']).unwrap_or(token);
    unsigned.starts_with(|c: char| c.is_ascii_digit())
}

fn closing_bracket(input: &str) -> ReadResult<'_, Value> {
    let (rest, _) = char(')').parse(input)?;
    fatal(ErrorKind::UnexpectedClosingBracket, input, rest)
}

struct Reader<'s> {
    source: &'s str,
    config: &'s ReadConfig,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

impl<'s> Reader<'s> {
    fn new(source: &'s str, config: &'s ReadConfig) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Reader {
            source,
            config,
            line_starts,
        }
    }

    /// Position of a suffix of the source
    fn position(&self, rest: &str) -> Position {
        let offset = self.source.len() - rest.len();
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        let mut column = self.source[line_start..offset].chars().count();
        if line == 0 {
            column += self.config.start.column;
        }
        Position::new(column, self.config.start.line + line)
    }

    fn span(&self, from: &str, to: &str) -> Span {
        Span {
            begin: self.position(from),
            end: self.position(to),
            file: self.config.file.clone(),
        }
    }

    fn read_all(&self) -> Result<Vec<Value>, Error> {
        let forms = terminated(
            many0(preceded(atmosphere, |input: &'s str| self.datum(input, 0))),
            atmosphere,
        )
        .parse(self.source);

        match forms {
            Ok(("", forms)) => Ok(forms),
            Ok((rest, _)) => Err(self.to_error(Failure::Mismatch(rest))),
            Err(nom::Err::Error(failure) | nom::Err::Failure(failure)) => {
                Err(self.to_error(failure))
            }
            Err(nom::Err::Incomplete(_)) => {
                let end = &self.source[self.source.len()..];
                Err(self.to_error(Failure::Mismatch(end)))
            }
        }
    }

    fn to_error(&self, failure: Failure<'_>) -> Error {
        match failure {
            Failure::Fatal { kind, from, to } => Error::about_text(kind, self.span(from, to)),
            Failure::Mismatch(at) => {
                let to = at.char_indices().nth(1).map_or(&at[at.len()..], |(i, _)| &at[i..]);
                Error::about_text(ErrorKind::Unsupported, self.span(at, to))
            }
        }
    }

    fn datum(&self, input: &'s str, depth: usize) -> ReadResult<'s, Value> {
        if depth >= MAX_PARSE_DEPTH {
            let to = input.char_indices().nth(1).map_or(&input[input.len()..], |(i, _)| &input[i..]);
            return fatal(ErrorKind::NestingTooDeep, input, to);
        }
        alt((
            |input: &'s str| self.list(input, depth),
            |input: &'s str| self.quote(input, depth),
            |input: &'s str| self.string(input),
            |input: &'s str| self.hash(input),
            closing_bracket,
            |input: &'s str| self.number(input),
            |input: &'s str| self.symbol(input),
        ))
        .parse(input)
    }

    fn list(&self, input: &'s str, depth: usize) -> ReadResult<'s, Value> {
        let element = preceded(
            (atmosphere, not(char(')'))),
            |input: &'s str| self.datum(input, depth + 1),
        );
        let (rest, items) = preceded(char('('), many0(element)).parse(input)?;

        match preceded(atmosphere, char::<&str, Failure<'s>>(')')).parse(rest) {
            Ok((rest, _)) => Ok((rest, Value::list(items).with_span(self.span(input, rest)))),
            Err(_) => fatal(ErrorKind::UnclosedList, input, &rest[rest.len()..]),
        }
    }

    /// `'datum` becomes `(quote datum)`
    fn quote(&self, input: &'s str, depth: usize) -> ReadResult<'s, Value> {
        let (after_quote, _) = char('\'').parse(input)?;
        let quote_symbol = Value::symbol("quote").with_span(self.span(input, after_quote));
        let (start, _) = atmosphere(after_quote)?;

        match self.datum(start, depth + 1) {
            Ok((rest, quoted)) => Ok((
                rest,
                Value::list([quote_symbol, quoted]).with_span(self.span(input, rest)),
            )),
            Err(nom::Err::Error(_)) => fatal(ErrorKind::MalformedForm, input, after_quote),
            Err(failure) => Err(failure),
        }
    }

    fn string(&self, input: &'s str) -> ReadResult<'s, Value> {
        let (mut remaining, _) = char('"').parse(input)?;
        let mut text = String::new();

        loop {
            let mut chars = remaining.chars();
            match chars.next() {
                Some('"') => {
                    let rest = chars.as_str();
                    return Ok((rest, Value::string(text).with_span(self.span(input, rest))));
                }
                Some('\\') => {
                    let escaped = match chars.next() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(_) => return fatal(ErrorKind::Unsupported, remaining, chars.as_str()),
                        None => return fatal(ErrorKind::UnclosedString, input, chars.as_str()),
                    };
                    text.push(escaped);
                }
                Some(ch) => text.push(ch),
                None => return fatal(ErrorKind::UnclosedString, input, remaining),
            }
            remaining = chars.as_str();
        }
    }

    /// `#t`, `#f`, `#!pragma`
    fn hash(&self, input: &'s str) -> ReadResult<'s, Value> {
        let (after_hash, _) = char('#').parse(input)?;
        let (rest, word) = take_while(|c| !is_separator(c)).parse(after_hash)?;

        let kind = match word {
            "t" | "T" => ValueKind::Bool(true),
            "f" | "F" => ValueKind::Bool(false),
            _ => match word.strip_prefix('!') {
                Some(pragma) => ValueKind::Shebang(pragma.into()),
                None => return fatal(ErrorKind::Unsupported, input, rest),
            },
        };
        Ok((rest, Value::new(kind).with_span(self.span(input, rest))))
    }

    fn number(&self, input: &'s str) -> ReadResult<'s, Value> {
        let (rest, text) = token(input)?;
        if !looks_numeric(text) {
            return Err(nom::Err::Error(Failure::Mismatch(input)));
        }

        let span = self.span(input, rest);
        if let Ok(n) = text.parse::<i64>() {
            return Ok((rest, Value::number(n).with_span(span)));
        }

        // All digits but out of integer range
        let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
        if unsigned.chars().all(|c| c.is_ascii_digit())
            && let Ok(x) = text.parse::<f64>()
            && x.is_finite()
        {
            return Ok((rest, Value::number(x).with_span(span)));
        }

        fatal(ErrorKind::BadNumber, input, rest)
    }

    fn symbol(&self, input: &'s str) -> ReadResult<'s, Value> {
        let (rest, name) = token(input)?;
        Ok((rest, Value::symbol(name).with_span(self.span(input, rest))))
    }
}
