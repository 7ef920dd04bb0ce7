//! Named → positional placeholder rewriting.
//!
//! Generated SQL references values as `:name`; Postgres wants `$1, $2, ...`.
//! [`rewrite`] scans the SQL once, skipping string literals (including
//! `E'...'` escape strings and `$tag$...$tag$` dollar-quoted bodies), quoted
//! identifiers, comments and `::` casts, and returns the positional SQL with
//! the values in bind order.

use crate::error::{DbalError, DbalResult};
use crate::value::{Context, Value};

/// Positional SQL plus its values in `$n` order.
#[derive(Debug, PartialEq)]
pub struct Bound<'a> {
    pub sql: String,
    pub values: Vec<&'a Value>,
}

/// Rewrite `:name` tokens in `sql` to `$n`, resolving each against `params`.
///
/// A name used more than once reuses its first index. A referenced name
/// missing from `params` is an [`DbalError::InvalidArgument`].
pub fn rewrite<'a>(sql: &str, params: &'a Context) -> DbalResult<Bound<'a>> {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut names: Vec<&str> = Vec::new();
    let mut values: Vec<&'a Value> = Vec::new();

    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'E' | b'e' if bytes.get(i + 1) == Some(&b'\'') && !follows_name(bytes, i) => {
                let end = escaped_end(bytes, i + 1);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'$' if !follows_name(bytes, i) && dollar_tag(bytes, i).is_some() => {
                let end = dollar_quoted_end(bytes, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'\'' | b'"' | b'`' => {
                let end = quoted_end(bytes, i, c);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(bytes.len(), |p| i + p + 1);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                out.push_str("::");
                i += 2;
            }
            b':' if bytes.get(i + 1).is_some_and(|b| is_name_start(*b)) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_name_char(bytes[end]) {
                    end += 1;
                }
                let name = &sql[start..end];
                let index = match names.iter().position(|n| *n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        let value = params.get(name).ok_or_else(|| {
                            DbalError::invalid_argument(format!(
                                "no value bound for placeholder ':{name}'"
                            ))
                        })?;
                        names.push(name);
                        values.push(value);
                        names.len()
                    }
                };
                out.push('$');
                out.push_str(&index.to_string());
                i = end;
            }
            _ => {
                // Copy the full UTF-8 sequence starting at `i`.
                let len = utf8_len(c);
                out.push_str(&sql[i..i + len]);
                i += len;
            }
        }
    }

    Ok(Bound { sql: out, values })
}

/// Index one past the closing quote; doubled quotes are escapes.
fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Index one past the closing quote of an `E'...'` string, where a
/// backslash escapes the next byte.
fn escaped_end(bytes: &[u8], quote_at: usize) -> usize {
    let mut i = quote_at + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// The `$tag$` opening at `start`, if any. `$1` is a positional parameter,
/// not a tag.
fn dollar_tag(bytes: &[u8], start: usize) -> Option<&[u8]> {
    let mut end = start + 1;
    if bytes.get(end).is_some_and(|b| is_name_start(*b)) {
        while end < bytes.len() && is_name_char(bytes[end]) {
            end += 1;
        }
    }
    (bytes.get(end) == Some(&b'$')).then(|| &bytes[start..=end])
}

/// Index one past the closing `$tag$` of the body opened at `start`.
fn dollar_quoted_end(bytes: &[u8], start: usize) -> usize {
    let Some(tag) = dollar_tag(bytes, start) else {
        return start + 1;
    };
    let body = start + tag.len();
    bytes[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map_or(bytes.len(), |p| body + p + tag.len())
}

/// Whether the byte before `i` continues an identifier.
fn follows_name(bytes: &[u8], i: usize) -> bool {
    i > 0 && (is_name_char(bytes[i - 1]) || bytes[i - 1] == b'$')
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}
