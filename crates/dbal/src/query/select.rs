//! SELECT statement builder.

use crate::error::DbalError;
use crate::expr::Expr;
use crate::query::{attach_predicate, record_error, require_name};
use crate::value::Context;
use std::collections::BTreeSet;
use std::str::FromStr;

/// ORDER BY direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    if s.trim().eq_ignore_ascii_case("asc") {
        Ok(Direction::Asc)
    } else if s.trim().eq_ignore_ascii_case("desc") {
        Ok(Direction::Desc)
    } else {
        Err(format!("unknown order direction '{s}', expected ASC or DESC"))
    }
}

impl FromStr for Direction {
    type Err = DbalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_direction(s).map_err(DbalError::InvalidArgument)
    }
}

/// Join type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// One JOIN clause.
#[derive(Clone, Debug)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on: Expr,
}

/// SELECT statement builder.
#[derive(Clone, Debug)]
pub struct Select {
    /// FROM table
    table: String,
    /// FROM alias
    alias: Option<String>,
    /// Selected fields with optional alias; empty means `*`
    fields: Vec<(String, Option<String>)>,
    /// JOIN clauses, in order
    joins: Vec<Join>,
    /// WHERE predicate
    where_expr: Option<Expr>,
    /// GROUP BY fields
    group_by: Vec<String>,
    /// HAVING predicate
    having: Option<Expr>,
    /// ORDER BY fields, in order
    order_by: Vec<(String, Direction)>,
    limit: Option<i64>,
    offset: Option<i64>,
    /// Literals from every clause
    context: Context,
    /// First deferred builder error
    build_error: Option<String>,
}

impl Select {
    /// Start a SELECT from `table`.
    pub fn from(table: &str) -> Self {
        let mut build_error = None;
        require_name(&mut build_error, "table", table);
        Self {
            table: table.to_string(),
            alias: None,
            fields: Vec::new(),
            joins: Vec::new(),
            where_expr: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            context: Context::new(),
            build_error,
        }
    }

    /// Start a SELECT from `table AS alias`.
    pub fn from_as(table: &str, alias: &str) -> Self {
        let mut select = Self::from(table);
        require_name(&mut select.build_error, "table alias", alias);
        select.alias = Some(alias.to_string());
        select
    }

    // ==================== Fields ====================

    /// Select one field.
    pub fn field(mut self, name: &str) -> Self {
        require_name(&mut self.build_error, "field", name);
        self.fields.push((name.to_string(), None));
        self
    }

    /// Select one field under an alias.
    pub fn field_as(mut self, name: &str, alias: &str) -> Self {
        require_name(&mut self.build_error, "field", name);
        require_name(&mut self.build_error, "field alias", alias);
        self.fields.push((name.to_string(), Some(alias.to_string())));
        self
    }

    /// Select several fields.
    pub fn fields(self, names: &[&str]) -> Self {
        names.iter().fold(self, |q, name| q.field(name))
    }

    // ==================== JOIN ====================

    fn join(mut self, kind: JoinKind, table: &str, alias: Option<&str>, mut on: Expr) -> Self {
        require_name(&mut self.build_error, "join table", table);
        self.context.append(&mut on.take_context());
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on,
        });
        self
    }

    /// Add `INNER JOIN table ON expr`.
    pub fn inner_join(self, table: &str, on: Expr) -> Self {
        self.join(JoinKind::Inner, table, None, on)
    }

    /// Add `INNER JOIN table AS alias ON expr`.
    pub fn inner_join_as(self, table: &str, alias: &str, on: Expr) -> Self {
        self.join(JoinKind::Inner, table, Some(alias), on)
    }

    /// Add `LEFT JOIN table ON expr`.
    pub fn left_join(self, table: &str, on: Expr) -> Self {
        self.join(JoinKind::Left, table, None, on)
    }

    /// Add `LEFT JOIN table AS alias ON expr`.
    pub fn left_join_as(self, table: &str, alias: &str, on: Expr) -> Self {
        self.join(JoinKind::Left, table, Some(alias), on)
    }

    // ==================== WHERE / GROUP BY / HAVING ====================

    /// Set the WHERE predicate; calling again ANDs with the existing one.
    pub fn where_(mut self, expr: Expr) -> Self {
        attach_predicate(&mut self.where_expr, &mut self.context, expr);
        self
    }

    /// Add a GROUP BY field.
    pub fn group_by(mut self, field: &str) -> Self {
        require_name(&mut self.build_error, "group by field", field);
        self.group_by.push(field.to_string());
        self
    }

    /// Add several GROUP BY fields.
    pub fn group_by_fields(self, fields: &[&str]) -> Self {
        fields.iter().fold(self, |q, f| q.group_by(f))
    }

    /// Set the HAVING predicate; calling again ANDs with the existing one.
    pub fn having(mut self, expr: Expr) -> Self {
        attach_predicate(&mut self.having, &mut self.context, expr);
        self
    }

    // ==================== ORDER BY ====================

    /// ORDER BY field ASC.
    pub fn order_by(mut self, field: &str) -> Self {
        require_name(&mut self.build_error, "order by field", field);
        self.order_by.push((field.to_string(), Direction::Asc));
        self
    }

    /// ORDER BY field DESC.
    pub fn order_by_desc(mut self, field: &str) -> Self {
        require_name(&mut self.build_error, "order by field", field);
        self.order_by.push((field.to_string(), Direction::Desc));
        self
    }

    /// ORDER BY each field ASC, in order.
    pub fn order_by_fields(self, fields: &[&str]) -> Self {
        fields.iter().fold(self, |q, f| q.order_by(f))
    }

    /// ORDER BY field with a textual direction (`asc`/`desc`, any case).
    pub fn order_by_dir(mut self, field: &str, direction: &str) -> Self {
        require_name(&mut self.build_error, "order by field", field);
        match parse_direction(direction) {
            Ok(dir) => self.order_by.push((field.to_string(), dir)),
            Err(message) => record_error(&mut self.build_error, message),
        }
        self
    }

    /// ORDER BY an ordered field → direction mapping.
    pub fn order_by_map<K, D>(self, entries: impl IntoIterator<Item = (K, D)>) -> Self
    where
        K: AsRef<str>,
        D: AsRef<str>,
    {
        entries
            .into_iter()
            .fold(self, |q, (f, d)| q.order_by_dir(f.as_ref(), d.as_ref()))
    }

    // ==================== LIMIT / OFFSET ====================

    /// Return at most `count` rows.
    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Skip `offset` rows.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Skip `offset` rows, then return at most `count` rows.
    ///
    /// The second argument is a row count, not an end position:
    /// `limit_offset(2, 7)` over ten rows returns rows 3 through 9.
    pub fn limit_offset(mut self, offset: i64, count: i64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(count);
        self
    }

    // ==================== Accessors ====================

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn selected_fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn where_expr(&self) -> Option<&Expr> {
        self.where_expr.as_ref()
    }

    pub fn group_by_list(&self) -> &[String] {
        &self.group_by
    }

    pub fn having_expr(&self) -> Option<&Expr> {
        self.having.as_ref()
    }

    pub fn order(&self) -> &[(String, Direction)] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    /// Literals collected from WHERE, HAVING and every JOIN condition.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// First malformed-usage error, reported at generation time.
    pub fn build_error(&self) -> Option<String> {
        self.build_error.clone()
    }

    /// FROM table, join tables, and tables of reachable EXISTS subqueries.
    pub fn affected_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        tables.insert(self.table.clone());
        for join in &self.joins {
            tables.insert(join.table.clone());
            join.on.collect_tables(&mut tables);
        }
        if let Some(expr) = &self.where_expr {
            expr.collect_tables(&mut tables);
        }
        if let Some(expr) = &self.having {
            expr.collect_tables(&mut tables);
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{eq, exists, gt, same};

    #[test]
    fn test_direction_parse() {
        assert_eq!("asc".parse::<Direction>().ok(), Some(Direction::Asc));
        assert_eq!(" DESC ".parse::<Direction>().ok(), Some(Direction::Desc));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_where_collects_context() {
        let q = Select::from("users").where_(eq("id", 5)).where_(gt("age", 18));
        assert_eq!(q.context().len(), 2);
        assert!(q.where_expr().is_some_and(|e| e.context().is_empty()));
    }

    #[test]
    fn test_join_on_same_binds_nothing() {
        let q = Select::from("a").inner_join("b", same("a.id", "b.a_id"));
        assert!(q.context().is_empty());
        assert_eq!(q.joins().len(), 1);
        assert_eq!(q.joins()[0].kind, JoinKind::Inner);
    }

    #[test]
    fn test_bad_direction_is_deferred() {
        let q = Select::from("users").order_by_dir("name", "up");
        assert!(q.build_error().is_some_and(|e| e.contains("up")));
        assert!(q.order().is_empty());
    }

    #[test]
    fn test_first_error_wins() {
        let q = Select::from("users").field("").order_by_dir("name", "up");
        assert!(q.build_error().is_some_and(|e| e.contains("field name")));
    }

    #[test]
    fn test_affected_tables() {
        let q = Select::from("users")
            .left_join("orders", same("users.id", "orders.user_id"))
            .where_(exists(Select::from("bans").where_(same("bans.user_id", "users.id"))));
        let tables: Vec<_> = q.affected_tables().into_iter().collect();
        assert_eq!(tables, vec!["bans", "orders", "users"]);
    }

    #[test]
    fn test_clone_is_independent() {
        let base = Select::from("users").where_(eq("id", 1));
        let extended = base.clone().where_(eq("status", "active"));
        assert_eq!(base.context().len(), 1);
        assert_eq!(extended.context().len(), 2);
    }
}
