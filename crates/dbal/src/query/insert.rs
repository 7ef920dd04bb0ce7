//! INSERT statement builder.

use crate::query::{Assignments, require_name};
use crate::value::{Context, Value};
use std::collections::BTreeSet;

/// INSERT statement builder.
#[derive(Clone, Debug)]
pub struct Insert {
    /// Target table
    table: String,
    /// Column assignments
    values: Assignments,
    /// Literals bound by the assignments
    context: Context,
    /// First deferred builder error
    build_error: Option<String>,
}

impl Insert {
    /// Start an INSERT into `table`.
    pub fn into(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            values: Assignments::default(),
            context: Context::new(),
            build_error,
        }
    }

    /// Set one column value.
    pub fn value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.values.assign(
            &mut self.context,
            &mut self.build_error,
            field.to_string(),
            value.into(),
        );
        self
    }

    /// Set several column values, in order.
    ///
    /// An empty iterator is recorded as an error.
    pub fn values<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut any = false;
        for (field, value) in entries {
            any = true;
            self.values
                .assign(&mut self.context, &mut self.build_error, field.into(), value.into());
        }
        if !any {
            self.values.mark_empty_call(&mut self.build_error);
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `(field, placeholder)` pairs in assignment order.
    pub fn assignments(&self) -> &[(String, String)] {
        self.values.entries()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// First malformed-usage error, including a missing VALUES clause.
    pub fn build_error(&self) -> Option<String> {
        if let Some(err) = &self.build_error {
            return Some(err.clone());
        }
        if self.values.is_empty() && !self.values.was_called() {
            return Some(format!("INSERT INTO {} has no values", self.table));
        }
        None
    }

    pub fn affected_tables(&self) -> BTreeSet<String> {
        BTreeSet::from([self.table.clone()])
    }
}
