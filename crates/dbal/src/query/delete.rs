//! DELETE statement builder.

use crate::expr::Expr;
use crate::query::{attach_predicate, require_name};
use crate::value::Context;
use std::collections::BTreeSet;

/// DELETE statement builder.
///
/// A DELETE without WHERE is rejected at generation time unless
/// [`Delete::all`] was called.
#[derive(Clone, Debug)]
pub struct Delete {
    /// Target table
    table: String,
    /// WHERE predicate
    where_expr: Option<Expr>,
    /// Whether DELETE without WHERE is intended
    allow_all: bool,
    /// Literals from WHERE
    context: Context,
    /// First deferred builder error
    build_error: Option<String>,
}

impl Delete {
    /// Start a DELETE from `table`.
    pub fn from(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            where_expr: None,
            allow_all: false,
            context: Context::new(),
            build_error,
        }
    }

    /// Set the WHERE predicate; calling again ANDs with the existing one.
    pub fn where_(mut self, expr: Expr) -> Self {
        attach_predicate(&mut self.where_expr, &mut self.context, expr);
        self
    }

    /// Allow deleting every row when no WHERE is given.
    pub fn all(mut self) -> Self {
        self.allow_all = true;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn where_expr(&self) -> Option<&Expr> {
        self.where_expr.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn build_error(&self) -> Option<String> {
        if let Some(err) = &self.build_error {
            return Some(err.clone());
        }
        if self.where_expr.is_none() && !self.allow_all {
            return Some(format!(
                "DELETE FROM {} has no WHERE; call all() to delete every row",
                self.table
            ));
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
