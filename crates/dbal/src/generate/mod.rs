//! Query → SQL generation.
//!
//! [`Generator`] walks a [`Query`] with an exhaustive `match` and renders it
//! through a [`Dialect`]. Literals never reach the SQL text: every value is
//! referenced as `:placeholder` and shipped in [`Statement::params`].

use crate::dialect::Dialect;
use crate::error::{DbalError, DbalResult};
use crate::expr::{CompareOp, Expr, Node};
use crate::query::{Create, Delete, Drop, Insert, Query, Select, Update};
use crate::value::{Context, Value};

/// Generated SQL plus exactly the parameters it references.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Context,
}

/// Renders queries for one dialect.
#[derive(Clone, Copy, Debug)]
pub struct Generator<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> Generator<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Render `query` into SQL text and its bound parameters.
    pub fn generate(&self, query: &Query) -> DbalResult<Statement> {
        let mut params = Context::new();
        let sql = match query {
            Query::Select(q) => self.select(q, &mut params)?,
            Query::Insert(q) => self.insert(q, &mut params)?,
            Query::Update(q) => self.update(q, &mut params)?,
            Query::Delete(q) => self.delete(q, &mut params)?,
            Query::Create(q) => self.create(q)?,
            Query::Drop(q) => self.drop_table(q)?,
        };
        Ok(Statement { sql, params })
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    // ==================== Statements ====================

    fn select(&self, q: &Select, params: &mut Context) -> DbalResult<String> {
        check(q.build_error())?;
        let source = q.context();

        let fields = if q.selected_fields().is_empty() {
            "*".to_string()
        } else {
            q.selected_fields()
                .iter()
                .map(|(name, alias)| match alias {
                    Some(alias) => format!("{} AS {}", self.quote(name), self.quote(alias)),
                    None => self.quote(name),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {fields} FROM {}", self.quote(q.table()));
        if let Some(alias) = q.alias() {
            sql.push_str(" AS ");
            sql.push_str(&self.quote(alias));
        }

        // JOINs
        for join in q.joins() {
            sql.push(' ');
            sql.push_str(join.kind.as_sql());
            sql.push(' ');
            sql.push_str(&self.quote(&join.table));
            if let Some(alias) = &join.alias {
                sql.push_str(" AS ");
                sql.push_str(&self.quote(alias));
            }
            sql.push_str(" ON ");
            sql.push_str(&self.expr(&join.on, source, params)?);
        }

        // WHERE
        if let Some(expr) = q.where_expr() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(expr, source, params)?);
        }

        // GROUP BY
        if !q.group_by_list().is_empty() {
            let groups: Vec<_> = q.group_by_list().iter().map(|g| self.quote(g)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        // HAVING
        if let Some(expr) = q.having_expr() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expr(expr, source, params)?);
        }

        // ORDER BY
        if !q.order().is_empty() {
            let order: Vec<_> = q
                .order()
                .iter()
                .map(|(field, dir)| format!("{} {}", self.quote(field), dir.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        let limit = non_negative("limit", q.limit_value())?;
        let offset = non_negative("offset", q.offset_value())?;
        if let Some(clause) = self.dialect.limit_clause(limit, offset)? {
            sql.push(' ');
            sql.push_str(&clause);
        }

        Ok(sql)
    }

    fn insert(&self, q: &Insert, params: &mut Context) -> DbalResult<String> {
        check(q.build_error())?;
        let mut fields = Vec::with_capacity(q.assignments().len());
        let mut holders = Vec::with_capacity(q.assignments().len());
        for (field, placeholder) in q.assignments() {
            fields.push(self.quote(field));
            holders.push(bind(placeholder, q.context(), params)?);
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(q.table()),
            fields.join(", "),
            holders.join(", ")
        ))
    }

    fn update(&self, q: &Update, params: &mut Context) -> DbalResult<String> {
        check(q.build_error())?;
        let source = q.context();
        let sets = q
            .assignments()
            .iter()
            .map(|(field, placeholder)| {
                Ok(format!("{} = {}", self.quote(field), bind(placeholder, source, params)?))
            })
            .collect::<DbalResult<Vec<_>>>()?;

        let mut sql = format!("UPDATE {} SET {}", self.quote(q.table_name()), sets.join(", "));
        if let Some(expr) = q.where_expr() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(expr, source, params)?);
        }
        Ok(sql)
    }

    fn delete(&self, q: &Delete, params: &mut Context) -> DbalResult<String> {
        check(q.build_error())?;
        let mut sql = format!("DELETE FROM {}", self.quote(q.table()));
        if let Some(expr) = q.where_expr() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(expr, q.context(), params)?);
        }
        Ok(sql)
    }

    fn create(&self, q: &Create) -> DbalResult<String> {
        check(q.build_error())?;
        let columns: Vec<_> = q
            .columns()
            .iter()
            .map(|(name, sql_type)| format!("{} {}", self.quote(name), sql_type.trim()))
            .collect();
        let guard = if q.is_if_not_exists() { "IF NOT EXISTS " } else { "" };
        Ok(format!(
            "CREATE TABLE {guard}{} ({})",
            self.quote(q.table_name()),
            columns.join(", ")
        ))
    }

    fn drop_table(&self, q: &Drop) -> DbalResult<String> {
        check(q.build_error())?;
        let guard = if q.is_if_exists() { "IF EXISTS " } else { "" };
        Ok(format!("DROP TABLE {guard}{}", self.quote(q.table_name())))
    }

    // ==================== Expressions ====================

    /// Render an expression whose placeholders live in `source`, copying every
    /// referenced value into `params`.
    fn expr(&self, expr: &Expr, source: &Context, params: &mut Context) -> DbalResult<String> {
        match expr.node() {
            Node::True => Ok("1 = 1".to_string()),
            Node::Not(inner) => Ok(format!("NOT ({})", self.expr(inner, source, params)?)),
            Node::And(children) => self.composite(children, Junction::And, source, params),
            Node::Or(children) => self.composite(children, Junction::Or, source, params),
            Node::Same { left, right } => {
                Ok(format!("{} = {}", self.quote(left), self.quote(right)))
            }
            Node::Compare {
                field,
                op,
                placeholder,
            } => {
                let value = lookup(placeholder, source)?;
                match (op, value.is_null()) {
                    (CompareOp::Eq, true) => Ok(format!("{} IS NULL", self.quote(field))),
                    (CompareOp::Ne, true) => Ok(format!("{} IS NOT NULL", self.quote(field))),
                    _ => Ok(format!(
                        "{} {} {}",
                        self.quote(field),
                        op.as_sql(),
                        bind(placeholder, source, params)?
                    )),
                }
            }
            Node::Like { field, placeholder } => Ok(format!(
                "{} LIKE {}",
                self.quote(field),
                bind(placeholder, source, params)?
            )),
            Node::In {
                field,
                placeholders,
            } => {
                if placeholders.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let holders = placeholders
                    .iter()
                    .map(|p| bind(p, source, params))
                    .collect::<DbalResult<Vec<_>>>()?;
                Ok(format!("{} IN ({})", self.quote(field), holders.join(", ")))
            }
            Node::Exists(subquery) => {
                // The subquery resolves against its own context.
                let sub = self.select(subquery, params)?;
                Ok(format!("EXISTS ({sub})"))
            }
        }
    }

    fn composite(
        &self,
        children: &[Expr],
        junction: Junction,
        source: &Context,
        params: &mut Context,
    ) -> DbalResult<String> {
        match children {
            [] => Ok(junction.identity().to_string()),
            [only] => self.expr(only, source, params),
            _ => {
                let parts = children
                    .iter()
                    .map(|child| {
                        let rendered = self.expr(child, source, params)?;
                        Ok(match Junction::of(child) {
                            Some(kind) if kind != junction => format!("({rendered})"),
                            _ => rendered,
                        })
                    })
                    .collect::<DbalResult<Vec<_>>>()?;
                Ok(parts.join(junction.separator()))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Junction {
    And,
    Or,
}

impl Junction {
    fn separator(self) -> &'static str {
        match self {
            Junction::And => " AND ",
            Junction::Or => " OR ",
        }
    }

    /// Rendering of an empty composite.
    fn identity(self) -> &'static str {
        match self {
            Junction::And => "1 = 1",
            Junction::Or => "1 = 0",
        }
    }

    /// The junction an expression renders as, looking through single-child
    /// composites. `None` for anything that renders without a top-level
    /// AND/OR.
    fn of(expr: &Expr) -> Option<Junction> {
        match expr.node() {
            Node::And(children) | Node::Or(children) if children.len() == 1 => {
                Junction::of(&children[0])
            }
            Node::And(children) if children.len() > 1 => Some(Junction::And),
            Node::Or(children) if children.len() > 1 => Some(Junction::Or),
            _ => None,
        }
    }
}

fn check(build_error: Option<String>) -> DbalResult<()> {
    match build_error {
        Some(message) => Err(DbalError::InvalidArgument(message)),
        None => Ok(()),
    }
}

fn non_negative(what: &str, value: Option<i64>) -> DbalResult<Option<u64>> {
    value
        .map(|n| {
            u64::try_from(n)
                .map_err(|_| DbalError::invalid_argument(format!("{what} cannot be negative: {n}")))
        })
        .transpose()
}

fn lookup<'c>(placeholder: &str, source: &'c Context) -> DbalResult<&'c Value> {
    source.get(placeholder).ok_or_else(|| {
        DbalError::invalid_argument(format!("placeholder '{placeholder}' has no bound value"))
    })
}

/// Copy the value behind `placeholder` into `params` and return its SQL token.
fn bind(placeholder: &str, source: &Context, params: &mut Context) -> DbalResult<String> {
    let value = lookup(placeholder, source)?;
    params.insert(placeholder.to_string(), value.clone());
    Ok(format!(":{placeholder}"))
}
