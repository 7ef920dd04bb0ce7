//! UPDATE statement builder.

use crate::expr::Expr;
use crate::query::{Assignments, attach_predicate, require_name};
use crate::value::{Context, Value};
use std::collections::BTreeSet;

/// UPDATE statement builder.
#[derive(Clone, Debug)]
pub struct Update {
    /// Target table
    table: String,
    /// SET assignments
    values: Assignments,
    /// WHERE predicate
    where_expr: Option<Expr>,
    /// Literals from SET and WHERE
    context: Context,
    /// First deferred builder error
    build_error: Option<String>,
}

impl Update {
    /// Start an UPDATE of `table`.
    pub fn table(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            values: Assignments::default(),
            where_expr: None,
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

    /// Set the WHERE predicate; calling again ANDs with the existing one.
    pub fn where_(mut self, expr: Expr) -> Self {
        attach_predicate(&mut self.where_expr, &mut self.context, expr);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// `(field, placeholder)` pairs in assignment order.
    pub fn assignments(&self) -> &[(String, String)] {
        self.values.entries()
    }

    pub fn where_expr(&self) -> Option<&Expr> {
        self.where_expr.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// First malformed-usage error, including a missing SET clause.
    pub fn build_error(&self) -> Option<String> {
        if let Some(err) = &self.build_error {
            return Some(err.clone());
        }
        if self.values.is_empty() && !self.values.was_called() {
            return Some(format!("UPDATE {} has no values", self.table));
        }
        None
    }

    /// Target table plus tables of EXISTS subqueries in WHERE.
    pub fn affected_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::from([self.table.clone()]);
        if let Some(expr) = &self.where_expr {
            expr.collect_tables(&mut tables);
        }
        tables
    }
}
