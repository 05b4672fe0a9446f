//! Expression AST (spec §4.1). Adapted from the lineage's `models.rs`
//! `Expression`/`BinaryOperator` enums, narrowed to the operator set the
//! spec actually names and widened with the property/index/method-call/
//! safe-navigation/static-resolution nodes the embedded language needs.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Copy)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equals,
    NotEquals,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Copy)]
pub enum UnaryOperator {
    Not,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// `#name` — a named variable binding in the evaluation context.
    Variable(String),
    /// A bare identifier — a property read off the root object.
    Identifier(String),
    /// `target.name` / `target?.name`.
    Property {
        target: Box<Expression>,
        name: String,
        safe: bool,
    },
    /// `target[index]`, including `target['literal']`.
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    /// `target.method(args...)`, optionally safe-navigated (`target?.method(...)`).
    MethodCall {
        target: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        safe: bool,
    },
    /// `T(fully.qualified.Type).method(args)` — sandboxed static resolution (§4.1).
    StaticCall {
        type_path: String,
        method: String,
        args: Vec<Expression>,
    },
    /// A bare `name(args)` call with no receiver and no dot — the only
    /// surface for the `setVariable` side-effect escape hatch (§4.1, §9);
    /// any other name is a sandbox violation at evaluation time.
    GlobalCall {
        name: String,
        args: Vec<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `cond ? then : else`.
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
}

impl Expression {
    /// Node count, used as the `average_complexity` proxy metric
    /// ([`crate::metrics::PerformanceMetrics`]) since the spec leaves that
    /// metric's definition to the implementation (§6, DESIGN.md).
    pub fn node_count(&self) -> u64 {
        match self {
            Expression::Literal(_) | Expression::Variable(_) | Expression::Identifier(_) => 1,
            Expression::Property { target, .. } => 1 + target.node_count(),
            Expression::Index { target, index } => 1 + target.node_count() + index.node_count(),
            Expression::MethodCall { target, args, .. } => {
                1 + target.node_count() + args.iter().map(Expression::node_count).sum::<u64>()
            }
            Expression::StaticCall { args, .. } | Expression::GlobalCall { args, .. } => {
                1 + args.iter().map(Expression::node_count).sum::<u64>()
            }
            Expression::UnaryOp { operand, .. } => 1 + operand.node_count(),
            Expression::BinaryOp { left, right, .. } => 1 + left.node_count() + right.node_count(),
            Expression::Conditional { condition, then_expr, else_expr } => {
                1 + condition.node_count() + then_expr.node_count() + else_expr.node_count()
            }
        }
    }
}
