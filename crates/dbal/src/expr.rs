//! Expression algebra for WHERE/HAVING/ON predicates.
//!
//! Expressions are built in polish notation from factory functions:
//!
//! ```ignore
//! use dbal::expr::{and, eq, like, or};
//!
//! let e = and(vec![
//!     eq("status", "active"),
//!     or(vec![like("name", "a%"), eq("role", "admin")]),
//! ]);
//! ```
//!
//! Every literal handed to a leaf factory is replaced by a freshly generated
//! placeholder and moved into the node's [`Context`]. Composites (`and`, `or`,
//! `not`) take their children by value and move every child context into their
//! own, so a context entry always has exactly one owner: the root of the tree
//! it currently belongs to.

use crate::placeholder::next_placeholder;
use crate::query::Select;
use crate::value::{Context, Value};
use std::collections::BTreeSet;

/// Comparison operators for [`Node::Compare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl CompareOp {
    /// SQL token for the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Ne => "<>",
        }
    }
}

/// The shape of an expression node.
#[derive(Clone, Debug)]
pub enum Node {
    /// Always true.
    True,
    /// Negation of the inner expression.
    Not(Box<Expr>),
    /// All children must hold.
    And(Vec<Expr>),
    /// At least one child must hold.
    Or(Vec<Expr>),
    /// Field-to-field equality; no literal involved.
    Same { left: String, right: String },
    /// `field op :placeholder`
    Compare {
        field: String,
        op: CompareOp,
        placeholder: String,
    },
    /// `field LIKE :placeholder`
    Like { field: String, placeholder: String },
    /// `field IN (:a, :b, ...)`
    In {
        field: String,
        placeholders: Vec<String>,
    },
    /// `EXISTS (subquery)`; the subquery keeps its own context.
    Exists(Box<Select>),
}

/// An immutable predicate tree plus the literals its leaves stand for.
#[derive(Clone, Debug)]
pub struct Expr {
    node: Node,
    context: Context,
}

impl Expr {
    fn leaf(node: Node, context: Context) -> Self {
        Self { node, context }
    }

    fn bind(value: impl Into<Value>, context: &mut Context) -> String {
        let name = next_placeholder();
        context.insert(name.clone(), value.into());
        name
    }

    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        let mut context = Context::new();
        let placeholder = Self::bind(value, &mut context);
        Self::leaf(
            Node::Compare {
                field: field.into(),
                op,
                placeholder,
            },
            context,
        )
    }

    fn composite(children: Vec<Expr>, wrap: fn(Vec<Expr>) -> Node) -> Self {
        let mut context = Context::new();
        let children = children
            .into_iter()
            .map(|mut child| {
                context.append(&mut child.context);
                child
            })
            .collect();
        Self {
            node: wrap(children),
            context,
        }
    }

    /// An expression that always holds.
    pub fn always() -> Self {
        Self::leaf(Node::True, Context::new())
    }

    /// AND of all children.
    pub fn and(children: Vec<Expr>) -> Self {
        Self::composite(children, Node::And)
    }

    /// OR of all children.
    pub fn or(children: Vec<Expr>) -> Self {
        Self::composite(children, Node::Or)
    }

    /// Negation.
    pub fn not(mut inner: Expr) -> Self {
        let context = std::mem::take(&mut inner.context);
        Self {
            node: Node::Not(Box::new(inner)),
            context,
        }
    }

    /// Field-to-field equality: `left = right`.
    pub fn same(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::leaf(
            Node::Same {
                left: left.into(),
                right: right.into(),
            },
            Context::new(),
        )
    }

    /// `field = value`; a `NULL` value renders as `IS NULL`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field <> value`; a `NULL` value renders as `IS NOT NULL`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    /// `field LIKE pattern`
    pub fn like(field: impl Into<String>, pattern: impl Into<Value>) -> Self {
        let mut context = Context::new();
        let placeholder = Self::bind(pattern, &mut context);
        Self::leaf(
            Node::Like {
                field: field.into(),
                placeholder,
            },
            context,
        )
    }

    /// `field IN (values...)`; an empty list never matches.
    pub fn in_list<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let mut context = Context::new();
        let placeholders = values
            .into_iter()
            .map(|v| Self::bind(v, &mut context))
            .collect();
        Self::leaf(
            Node::In {
                field: field.into(),
                placeholders,
            },
            context,
        )
    }

    /// `EXISTS (subquery)`
    pub fn exists(subquery: Select) -> Self {
        Self::leaf(Node::Exists(Box::new(subquery)), Context::new())
    }

    /// The node shape.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Literals owned by this node (empty once composed into a parent).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Move the context out, leaving this expression with none.
    pub(crate) fn take_context(&mut self) -> Context {
        std::mem::take(&mut self.context)
    }

    /// Tables read by `EXISTS` subqueries anywhere in the tree.
    pub(crate) fn collect_tables(&self, out: &mut BTreeSet<String>) {
        match &self.node {
            Node::Not(inner) => inner.collect_tables(out),
            Node::And(children) | Node::Or(children) => {
                for child in children {
                    child.collect_tables(out);
                }
            }
            Node::Exists(select) => out.extend(select.affected_tables()),
            Node::True
            | Node::Same { .. }
            | Node::Compare { .. }
            | Node::Like { .. }
            | Node::In { .. } => {}
        }
    }
}

/// An expression that always holds.
pub fn always() -> Expr {
    Expr::always()
}

/// AND of all children.
pub fn and(children: Vec<Expr>) -> Expr {
    Expr::and(children)
}

/// OR of all children.
pub fn or(children: Vec<Expr>) -> Expr {
    Expr::or(children)
}

/// Negation.
pub fn not(inner: Expr) -> Expr {
    Expr::not(inner)
}

/// Field-to-field equality.
pub fn same(left: impl Into<String>, right: impl Into<String>) -> Expr {
    Expr::same(left, right)
}

pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::eq(field, value)
}

pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::ne(field, value)
}

pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::lt(field, value)
}

pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::le(field, value)
}

pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::gt(field, value)
}

pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::ge(field, value)
}

pub fn like(field: impl Into<String>, pattern: impl Into<Value>) -> Expr {
    Expr::like(field, pattern)
}

pub fn in_list<V: Into<Value>>(
    field: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Expr {
    Expr::in_list(field, values)
}

pub fn exists(subquery: Select) -> Expr {
    Expr::exists(subquery)
}
