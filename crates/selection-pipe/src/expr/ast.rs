//! Syntax tree of pipe expressions.

use std::sync::Arc;

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Bool(bool),
    Null,
    Undefined,
    Identifier(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOperator, Box<Expr>),
    Binary(BinaryOperator, Box<Expr>, Box<Expr>),
    Logical(LogicalOperator, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Arrow(Arc<ArrowFunction>),
}

/// A piece of a template string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePart {
    Text(String),
    Expr(Expr),
}

/// `(params) => body`
#[derive(Debug, PartialEq)]
pub(crate) struct ArrowFunction {
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOperator {
    Not,
    Negate,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    StrictEquals,
    StrictNotEquals,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOperator {
    And,
    Or,
    Nullish,
}

/// A postfix operation, folded onto its base while parsing.
pub(crate) enum PostfixOp {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

impl PostfixOp {
    pub(crate) fn apply(self, base: Expr) -> Expr {
        match self {
            PostfixOp::Member(name) => Expr::Member(Box::new(base), name),
            PostfixOp::Index(index) => Expr::Index(Box::new(base), Box::new(index)),
            PostfixOp::Call(args) => Expr::Call(Box::new(base), args),
        }
    }
}
