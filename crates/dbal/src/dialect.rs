//! SQL dialects: the rendering rules that differ between engines.
//!
//! Everything dialect-neutral lives in [`crate::generate`]; a dialect only
//! decides identifier quoting and how row limits are spelled.

use crate::error::{DbalError, DbalResult};
use std::fmt::Debug;

/// Dialect-specific rendering rules.
pub trait Dialect: Debug + Send + Sync {
    /// Human-readable dialect name.
    fn name(&self) -> &'static str;

    /// Opening and closing identifier quote character.
    fn quote_char(&self) -> char;

    /// Quote an identifier.
    ///
    /// Dotted names are quoted per part (`a.b` → `"a"."b"`), `*` parts are
    /// left alone, and embedded quote characters are doubled.
    fn quote_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        name.split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    let escaped = part.replace(q, &format!("{q}{q}"));
                    format!("{q}{escaped}{q}")
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render the row-limiting clause, or `None` when neither bound is set.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> DbalResult<Option<String>>;
}

/// Strict ANSI SQL (`FETCH FIRST n ROWS ONLY`, no OFFSET support).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ansi;

impl Dialect for Ansi {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> DbalResult<Option<String>> {
        if offset.is_some() {
            return Err(DbalError::unsupported(
                "OFFSET is not supported by the ANSI dialect",
            ));
        }
        Ok(limit.map(|n| format!("FETCH FIRST {n} ROWS ONLY")))
    }
}

/// PostgreSQL (`LIMIT n OFFSET m`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> DbalResult<Option<String>> {
        Ok(match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (None, Some(o)) => Some(format!("OFFSET {o}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
        })
    }
}

/// MySQL / MariaDB (backtick quoting, `LIMIT n OFFSET m`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> DbalResult<Option<String>> {
        Ok(match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            // MySQL has no standalone OFFSET; the documented idiom is the max row count.
            (None, Some(o)) => Some(format!("LIMIT {} OFFSET {o}", u64::MAX)),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
        })
    }
}
