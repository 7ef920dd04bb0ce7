//! Minimal CREATE TABLE / DROP TABLE builders.

use crate::query::{record_error, require_name};
use std::collections::BTreeSet;

/// Column types are emitted verbatim, so only a conservative character set is allowed.
fn is_safe_type(sql_type: &str) -> bool {
    !sql_type.trim().is_empty()
        && sql_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ','))
}

/// CREATE TABLE builder.
#[derive(Clone, Debug)]
pub struct Create {
    table: String,
    columns: Vec<(String, String)>,
    if_not_exists: bool,
    build_error: Option<String>,
}

impl Create {
    pub fn table(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            if_not_exists: false,
            build_error,
        }
    }

    /// Add a column with a SQL type such as `INTEGER` or `VARCHAR(255)`.
    pub fn column(mut self, name: &str, sql_type: &str) -> Self {
        require_name(&mut self.build_error, "column", name);
        if !is_safe_type(sql_type) {
            record_error(
                &mut self.build_error,
                format!("invalid column type '{sql_type}' for column '{name}'"),
            );
        }
        self.columns.push((name.to_string(), sql_type.to_string()));
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    pub fn is_if_not_exists(&self) -> bool {
        self.if_not_exists
    }

    pub fn build_error(&self) -> Option<String> {
        if let Some(err) = &self.build_error {
            return Some(err.clone());
        }
        if self.columns.is_empty() {
            return Some(format!("CREATE TABLE {} has no columns", self.table));
        }
        None
    }

    pub fn affected_tables(&self) -> BTreeSet<String> {
        BTreeSet::from([self.table.clone()])
    }
}

/// DROP TABLE builder.
#[derive(Clone, Debug)]
pub struct Drop {
    table: String,
    if_exists: bool,
    build_error: Option<String>,
}

impl Drop {
    pub fn table(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            if_exists: false,
            build_error,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn is_if_exists(&self) -> bool {
        self.if_exists
    }

    pub fn build_error(&self) -> Option<String> {
        self.build_error.clone()
    }

    pub fn affected_tables(&self) -> BTreeSet<String> {
        BTreeSet::from([self.table.clone()])
    }
}
