//! Statement builders.
//!
//! One builder per statement kind, collected under the closed [`Query`] sum
//! type so generation can dispatch with an exhaustive `match`.
//!
//! Builders are lazy: fluent methods never fail. Malformed usage (bad order
//! direction, positional value keys, missing VALUES) is recorded and reported
//! as [`DbalError::InvalidArgument`](crate::DbalError::InvalidArgument) when
//! the statement is generated.
//!
//! # Usage
//!
//! ```ignore
//! use dbal::expr::{eq, same};
//! use dbal::query::{Delete, Select};
//!
//! let users = Select::from("users")
//!     .inner_join("orders", same("users.id", "orders.user_id"))
//!     .where_(eq("users.status", "active"))
//!     .order_by_desc("orders.created_at")
//!     .limit(20);
//!
//! let purge = Delete::from("sessions").where_(eq("user_id", 5));
//! ```

mod delete;
mod insert;
mod schema;
mod select;
mod update;

pub use delete::Delete;
pub use insert::Insert;
pub use schema::{Create, Drop};
pub use select::{Direction, Join, JoinKind, Select};
pub use update::Update;

use crate::expr::Expr;
use crate::placeholder::next_placeholder;
use crate::value::{Context, Value};
use std::collections::BTreeSet;

/// Any buildable statement.
#[derive(Clone, Debug)]
pub enum Query {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Create(Create),
    Drop(Drop),
}

impl Query {
    /// Whether executing this statement leaves stored data untouched.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Query::Select(_))
    }

    /// Statement keyword, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Query::Select(_) => "SELECT",
            Query::Insert(_) => "INSERT",
            Query::Update(_) => "UPDATE",
            Query::Delete(_) => "DELETE",
            Query::Create(_) => "CREATE",
            Query::Drop(_) => "DROP",
        }
    }

    /// Every table this statement reads from or writes to.
    pub fn affected_tables(&self) -> BTreeSet<String> {
        match self {
            Query::Select(q) => q.affected_tables(),
            Query::Insert(q) => q.affected_tables(),
            Query::Update(q) => q.affected_tables(),
            Query::Delete(q) => q.affected_tables(),
            Query::Create(q) => q.affected_tables(),
            Query::Drop(q) => q.affected_tables(),
        }
    }

    /// Placeholder context collected from every clause.
    pub fn context(&self) -> &Context {
        static EMPTY: Context = Context::new();
        match self {
            Query::Select(q) => q.context(),
            Query::Insert(q) => q.context(),
            Query::Update(q) => q.context(),
            Query::Delete(q) => q.context(),
            Query::Create(_) | Query::Drop(_) => &EMPTY,
        }
    }
}

impl From<Select> for Query {
    fn from(q: Select) -> Self {
        Query::Select(q)
    }
}

impl From<Insert> for Query {
    fn from(q: Insert) -> Self {
        Query::Insert(q)
    }
}

impl From<Update> for Query {
    fn from(q: Update) -> Self {
        Query::Update(q)
    }
}

impl From<Delete> for Query {
    fn from(q: Delete) -> Self {
        Query::Delete(q)
    }
}

impl From<Create> for Query {
    fn from(q: Create) -> Self {
        Query::Create(q)
    }
}

impl From<Drop> for Query {
    fn from(q: Drop) -> Self {
        Query::Drop(q)
    }
}

/// Keep the first recorded builder error.
pub(crate) fn record_error(slot: &mut Option<String>, message: impl Into<String>) {
    if slot.is_none() {
        *slot = Some(message.into());
    }
}

/// Record an error if `name` is empty.
pub(crate) fn require_name(slot: &mut Option<String>, what: &str, name: &str) {
    if name.trim().is_empty() {
        record_error(slot, format!("{what} name cannot be empty"));
    }
}

/// Attach `expr` to `current`, AND-ing with whatever is already there, and move
/// the expression's literals into the builder context.
pub(crate) fn attach_predicate(current: &mut Option<Expr>, context: &mut Context, mut expr: Expr) {
    context.append(&mut expr.take_context());
    *current = Some(match current.take() {
        Some(existing) => Expr::and(vec![existing, expr]),
        None => expr,
    });
}

/// Ordered `field = :placeholder` assignments for INSERT/UPDATE.
#[derive(Clone, Debug, Default)]
pub(crate) struct Assignments {
    entries: Vec<(String, String)>,
    touched: bool,
}

impl Assignments {
    /// Pull `value` into `context` under a fresh placeholder and record the pair.
    pub(crate) fn assign(
        &mut self,
        context: &mut Context,
        build_error: &mut Option<String>,
        field: String,
        value: Value,
    ) {
        self.touched = true;
        if is_positional_key(&field) {
            record_error(
                build_error,
                format!("values require named fields, got positional key '{field}'"),
            );
            return;
        }
        if self.entries.iter().any(|(f, _)| *f == field) {
            record_error(build_error, format!("field '{field}' assigned twice"));
            return;
        }
        let name = next_placeholder();
        context.insert(name.clone(), value);
        self.entries.push((field, name));
    }

    /// Record that `values()` was called with nothing in it.
    pub(crate) fn mark_empty_call(&mut self, build_error: &mut Option<String>) {
        self.touched = true;
        record_error(build_error, "values() requires at least one field");
    }

    /// `(field, placeholder)` pairs in assignment order.
    pub(crate) fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn was_called(&self) -> bool {
        self.touched
    }
}

/// A value key that looks like a list index rather than a field name.
fn is_positional_key(field: &str) -> bool {
    field.trim().is_empty() || field.chars().all(|c| c.is_ascii_digit())
}
