use crate::compiler_frontend::pcal::pcal_nodes::Uid;
use serde::{Deserialize, Serialize};

/// A TLA+ expression embedded in the algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub uid: Uid,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    Number(i64),
    Bool(bool),
    String(String),

    /// Resolved through `DefinitionRegistry::follow_reference` using this node's Uid.
    Identifier(String),

    /// `f[x]` or `f[x, y]`
    FunctionCall {
        function: Box<Expression>,
        params: Vec<Expression>,
    },

    BinOp {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// `<<a, b, c>>`
    Tuple(Vec<Expression>),

    /// `IF c THEN a ELSE b`
    If {
        condition: Box<Expression>,
        yes: Box<Expression>,
        no: Box<Expression>,
    },

    /// A user or standard-library operator application: `Len(s)`, `Append(s, x)`
    OperatorCall {
        name: String,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl Expression {
    pub fn new(uid: Uid, kind: ExpressionKind) -> Self {
        Self { uid, kind }
    }

    /// Uids of every identifier inside this expression, in source order.
    pub fn visit_identifiers(&self, visit: &mut impl FnMut(Uid)) {
        match &self.kind {
            ExpressionKind::Identifier(_) => visit(self.uid),
            ExpressionKind::Number(_) | ExpressionKind::Bool(_) | ExpressionKind::String(_) => {}
            ExpressionKind::FunctionCall { function, params } => {
                function.visit_identifiers(visit);
                for param in params {
                    param.visit_identifiers(visit);
                }
            }
            ExpressionKind::BinOp { lhs, rhs, .. } => {
                lhs.visit_identifiers(visit);
                rhs.visit_identifiers(visit);
            }
            ExpressionKind::Unary { operand, .. } => operand.visit_identifiers(visit),
            ExpressionKind::Tuple(elements) | ExpressionKind::OperatorCall { args: elements, .. } => {
                for element in elements {
                    element.visit_identifiers(visit);
                }
            }
            ExpressionKind::If {
                condition,
                yes,
                no,
            } => {
                condition.visit_identifiers(visit);
                yes.visit_identifiers(visit);
                no.visit_identifiers(visit);
            }
        }
    }

    pub(crate) fn visit_uids(&self, visit: &mut impl FnMut(Uid)) {
        visit(self.uid);
        match &self.kind {
            ExpressionKind::Number(_)
            | ExpressionKind::Bool(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Identifier(_) => {}
            ExpressionKind::FunctionCall { function, params } => {
                function.visit_uids(visit);
                for param in params {
                    param.visit_uids(visit);
                }
            }
            ExpressionKind::BinOp { lhs, rhs, .. } => {
                lhs.visit_uids(visit);
                rhs.visit_uids(visit);
            }
            ExpressionKind::Unary { operand, .. } => operand.visit_uids(visit),
            ExpressionKind::Tuple(elements) => {
                for element in elements {
                    element.visit_uids(visit);
                }
            }
            ExpressionKind::If {
                condition,
                yes,
                no,
            } => {
                condition.visit_uids(visit);
                yes.visit_uids(visit);
                no.visit_uids(visit);
            }
            ExpressionKind::OperatorCall { args, .. } => {
                for arg in args {
                    arg.visit_uids(visit);
                }
            }
        }
    }
}
