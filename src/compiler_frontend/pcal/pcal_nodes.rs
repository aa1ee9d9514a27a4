//! ============================================================
//!                     PlusCal Nodes
//! ============================================================
//! The macro-expanded algorithm handed over by the parser.
//!  - Every label, declaration, statement and expression carries a Uid
//!  - Labels do not nest (the parser flattens them)
//!  - Macro calls are expanded before this tree reaches the compiler core
//!
//! Nodes are compared by Uid, never by structure or address, so a subtree
//! can be cloned freely without losing its identity.

use crate::compiler_frontend::pcal::tla_expressions::Expression;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================
// Stable IDs
// ============================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fresh Uids. The parser owns one of these; tests and the
/// node builders use it to create trees by hand.
#[derive(Debug, Default)]
pub struct UidGenerator {
    next: u32,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_uid(&mut self) -> Uid {
        let uid = Uid(self.next);
        self.next += 1;
        uid
    }
}

// ============================================================
// Source positions
// ============================================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharPosition {
    pub line_number: i32,
    pub char_column: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLocation {
    pub start_pos: CharPosition,
    pub end_pos: CharPosition,
}

impl TextLocation {
    pub fn new_just_line(line: i32) -> Self {
        Self {
            start_pos: CharPosition {
                line_number: line,
                char_column: 0,
            },
            end_pos: CharPosition {
                line_number: line,
                char_column: 120, // Arbitrary number
            },
        }
    }
}

// ============================================================
// Algorithm
// ============================================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Algorithm {
    pub name: String,

    #[serde(default)]
    pub constants: Vec<ConstantDecl>,

    /// Global (shared) variables.
    #[serde(default)]
    pub variables: Vec<VariableDecl>,

    #[serde(default)]
    pub procedures: Vec<Procedure>,

    pub processes: Vec<Process>,
}

impl Algorithm {
    /// Visits every Uid in the algorithm in declaration order.
    pub fn for_each_uid(&self, mut visit: impl FnMut(Uid)) {
        for constant in &self.constants {
            visit(constant.uid);
            if let Some(value) = &constant.value {
                value.visit_uids(&mut visit);
            }
        }

        for variable in &self.variables {
            variable.visit_uids(&mut visit);
        }

        for procedure in &self.procedures {
            visit(procedure.uid);
            for decl in procedure.params.iter().chain(&procedure.variables) {
                decl.visit_uids(&mut visit);
            }
            for statement in &procedure.body {
                statement.visit_uids(&mut visit);
            }
        }

        for process in &self.processes {
            visit(process.uid);
            visit(process.self_decl);
            match &process.self_value {
                ProcessSelf::Single(value) => value.visit_uids(&mut visit),
                ProcessSelf::Range { low, high } => {
                    low.visit_uids(&mut visit);
                    high.visit_uids(&mut visit);
                }
            }
            for decl in &process.variables {
                decl.visit_uids(&mut visit);
            }
            for statement in &process.body {
                statement.visit_uids(&mut visit);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantDecl {
    pub uid: Uid,
    pub name: String,

    /// Constants without a value must be supplied by the generated program's caller.
    #[serde(default)]
    pub value: Option<Expression>,
}

/// How the type pass resolved a variable's storage.
/// Slices are addressed 1-based on the TLA+ side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Plain,
    Slice,
    Map,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub uid: Uid,
    pub name: String,

    #[serde(default)]
    pub value: Option<Expression>,

    #[serde(default)]
    pub resource: ResourceKind,

    #[serde(default)]
    pub location: TextLocation,
}

impl VariableDecl {
    fn visit_uids(&self, visit: &mut impl FnMut(Uid)) {
        visit(self.uid);
        if let Some(value) = &self.value {
            value.visit_uids(visit);
        }
    }
}

// ============================================================
// Processes and procedures
// ============================================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub uid: Uid,
    pub name: String,

    /// Declaration Uid of this process's implicit `self`.
    pub self_decl: Uid,
    pub self_value: ProcessSelf,

    #[serde(default)]
    pub variables: Vec<VariableDecl>,

    pub body: Vec<Statement>,
}

/// `process (P = e)` or `process (P \in low..high)`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessSelf {
    Single(Expression),
    Range { low: Expression, high: Expression },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub uid: Uid,
    pub name: String,

    #[serde(default)]
    pub params: Vec<VariableDecl>,

    #[serde(default)]
    pub variables: Vec<VariableDecl>,

    pub body: Vec<Statement>,
}

// ============================================================
// Statements
// ============================================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub uid: Uid,
    pub name: String,
}

/// The implicit label every process and procedure can jump to in order to finish.
pub const DONE_LABEL: &str = "Done";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub uid: Uid,
    pub kind: StatementKind,

    #[serde(default)]
    pub location: TextLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentPair {
    pub lhs: Expression,
    pub rhs: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    LabeledStatements {
        label: Label,
        statements: Vec<Statement>,
    },

    While {
        condition: Expression,
        body: Vec<Statement>,
    },

    If {
        condition: Expression,
        yes: Vec<Statement>,
        #[serde(default)]
        no: Vec<Statement>,
    },

    Either {
        cases: Vec<Vec<Statement>>,
    },

    /// `a := x || b[i] := y`, all pairs happen simultaneously.
    Assignment {
        pairs: Vec<AssignmentPair>,
    },

    Return,

    Skip,

    Call {
        target: String,
        arguments: Vec<Expression>,
    },

    /// Only ever present when macro expansion has not run.
    MacroCall {
        target: String,
        arguments: Vec<Expression>,
    },

    With {
        variables: Vec<VariableDecl>,
        body: Vec<Statement>,
    },

    Print(Expression),

    Assert(Expression),

    Await(Expression),

    Goto(String),
}

impl Statement {
    pub fn new(uid: Uid, kind: StatementKind) -> Self {
        Self {
            uid,
            kind,
            location: TextLocation::default(),
        }
    }

    /// True for statements that hand control somewhere other than the next statement
    /// or that contain a label. PlusCal requires a label after any of these, so the
    /// code generator can close sections at the end of the enclosing branch.
    pub fn transfers_control(&self) -> bool {
        match &self.kind {
            StatementKind::LabeledStatements { .. }
            | StatementKind::Return
            | StatementKind::Call { .. }
            | StatementKind::MacroCall { .. }
            | StatementKind::Goto(_) => true,

            StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                body.iter().any(Statement::transfers_control)
            }

            StatementKind::If { yes, no, .. } => yes
                .iter()
                .chain(no.iter())
                .any(Statement::transfers_control),

            StatementKind::Either { cases } => cases
                .iter()
                .flatten()
                .any(Statement::transfers_control),

            StatementKind::Assignment { .. }
            | StatementKind::Skip
            | StatementKind::Print(_)
            | StatementKind::Assert(_)
            | StatementKind::Await(_) => false,
        }
    }

    fn visit_uids(&self, visit: &mut impl FnMut(Uid)) {
        visit(self.uid);
        match &self.kind {
            StatementKind::LabeledStatements { label, statements } => {
                visit(label.uid);
                for statement in statements {
                    statement.visit_uids(visit);
                }
            }
            StatementKind::While { condition, body } => {
                condition.visit_uids(visit);
                for statement in body {
                    statement.visit_uids(visit);
                }
            }
            StatementKind::If { condition, yes, no } => {
                condition.visit_uids(visit);
                for statement in yes.iter().chain(no) {
                    statement.visit_uids(visit);
                }
            }
            StatementKind::Either { cases } => {
                for statement in cases.iter().flatten() {
                    statement.visit_uids(visit);
                }
            }
            StatementKind::Assignment { pairs } => {
                for pair in pairs {
                    pair.lhs.visit_uids(visit);
                    pair.rhs.visit_uids(visit);
                }
            }
            StatementKind::Call { arguments, .. } | StatementKind::MacroCall { arguments, .. } => {
                for argument in arguments {
                    argument.visit_uids(visit);
                }
            }
            StatementKind::With { variables, body } => {
                for decl in variables {
                    decl.visit_uids(visit);
                }
                for statement in body {
                    statement.visit_uids(visit);
                }
            }
            StatementKind::Print(value)
            | StatementKind::Assert(value)
            | StatementKind::Await(value) => value.visit_uids(visit),
            StatementKind::Return | StatementKind::Skip | StatementKind::Goto(_) => {}
        }
    }
}
