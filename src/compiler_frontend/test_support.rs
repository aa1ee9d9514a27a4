#![cfg(test)]

use crate::compiler_frontend::analysis::atomicity::{AtomicityAnalysis, infer_atomicity};
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{
    Algorithm, AssignmentPair, ConstantDecl, Label, Procedure, Process, ProcessSelf, ResourceKind,
    Statement, StatementKind, TextLocation, Uid, UidGenerator, VariableDecl,
};
use crate::compiler_frontend::pcal::tla_expressions::{
    BinaryOperator, Expression, ExpressionKind, UnaryOperator,
};
use crate::compiler_frontend::resolution::resolve_algorithm;

/// Builds algorithm trees by hand, handing every node a fresh Uid.
#[derive(Default)]
pub(crate) struct NodeBuilder {
    uids: UidGenerator,
}

impl NodeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn uid(&mut self) -> Uid {
        self.uids.next_uid()
    }

    // ------------------------------
    // Expressions
    // ------------------------------
    pub(crate) fn expression(&mut self, kind: ExpressionKind) -> Expression {
        Expression::new(self.uid(), kind)
    }

    pub(crate) fn num(&mut self, value: i64) -> Expression {
        self.expression(ExpressionKind::Number(value))
    }

    pub(crate) fn boolean(&mut self, value: bool) -> Expression {
        self.expression(ExpressionKind::Bool(value))
    }

    pub(crate) fn string(&mut self, value: &str) -> Expression {
        self.expression(ExpressionKind::String(value.to_owned()))
    }

    pub(crate) fn ident(&mut self, name: &str) -> Expression {
        self.expression(ExpressionKind::Identifier(name.to_owned()))
    }

    /// `name[params...]`
    pub(crate) fn index(&mut self, name: &str, params: Vec<Expression>) -> Expression {
        let function = self.ident(name);
        self.expression(ExpressionKind::FunctionCall {
            function: Box::new(function),
            params,
        })
    }

    pub(crate) fn binop(&mut self, op: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        self.expression(ExpressionKind::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub(crate) fn not(&mut self, operand: Expression) -> Expression {
        self.expression(ExpressionKind::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        })
    }

    pub(crate) fn operator(&mut self, name: &str, args: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::OperatorCall {
            name: name.to_owned(),
            args,
        })
    }

    // ------------------------------
    // Statements
    // ------------------------------
    pub(crate) fn statement(&mut self, kind: StatementKind) -> Statement {
        Statement::new(self.uid(), kind)
    }

    pub(crate) fn label(&mut self, name: &str, statements: Vec<Statement>) -> Statement {
        let label = Label {
            uid: self.uid(),
            name: name.to_owned(),
        };
        self.statement(StatementKind::LabeledStatements { label, statements })
    }

    pub(crate) fn assign(&mut self, lhs: Expression, rhs: Expression) -> Statement {
        self.statement(StatementKind::Assignment {
            pairs: vec![AssignmentPair { lhs, rhs }],
        })
    }

    pub(crate) fn assign_pairs(&mut self, pairs: Vec<(Expression, Expression)>) -> Statement {
        self.statement(StatementKind::Assignment {
            pairs: pairs
                .into_iter()
                .map(|(lhs, rhs)| AssignmentPair { lhs, rhs })
                .collect(),
        })
    }

    /// `name := name + amount`
    pub(crate) fn increment(&mut self, name: &str, amount: i64) -> Statement {
        let target = self.ident(name);
        let current = self.ident(name);
        let amount = self.num(amount);
        let value = self.binop(BinaryOperator::Add, current, amount);
        self.assign(target, value)
    }

    pub(crate) fn while_loop(&mut self, condition: Expression, body: Vec<Statement>) -> Statement {
        self.statement(StatementKind::While { condition, body })
    }

    pub(crate) fn if_else(
        &mut self,
        condition: Expression,
        yes: Vec<Statement>,
        no: Vec<Statement>,
    ) -> Statement {
        self.statement(StatementKind::If { condition, yes, no })
    }

    pub(crate) fn either(&mut self, cases: Vec<Vec<Statement>>) -> Statement {
        self.statement(StatementKind::Either { cases })
    }

    pub(crate) fn with(&mut self, variables: Vec<VariableDecl>, body: Vec<Statement>) -> Statement {
        self.statement(StatementKind::With { variables, body })
    }

    pub(crate) fn call(&mut self, target: &str, arguments: Vec<Expression>) -> Statement {
        self.statement(StatementKind::Call {
            target: target.to_owned(),
            arguments,
        })
    }

    pub(crate) fn macro_call(&mut self, target: &str) -> Statement {
        self.statement(StatementKind::MacroCall {
            target: target.to_owned(),
            arguments: Vec::new(),
        })
    }

    pub(crate) fn goto(&mut self, target: &str) -> Statement {
        self.statement(StatementKind::Goto(target.to_owned()))
    }

    pub(crate) fn ret(&mut self) -> Statement {
        self.statement(StatementKind::Return)
    }

    pub(crate) fn skip(&mut self) -> Statement {
        self.statement(StatementKind::Skip)
    }

    pub(crate) fn print(&mut self, value: Expression) -> Statement {
        self.statement(StatementKind::Print(value))
    }

    pub(crate) fn assert(&mut self, value: Expression) -> Statement {
        self.statement(StatementKind::Assert(value))
    }

    pub(crate) fn await_(&mut self, value: Expression) -> Statement {
        self.statement(StatementKind::Await(value))
    }

    // ------------------------------
    // Declarations
    // ------------------------------
    pub(crate) fn variable(&mut self, name: &str, value: Option<Expression>) -> VariableDecl {
        self.variable_of(name, value, ResourceKind::Plain)
    }

    pub(crate) fn variable_of(
        &mut self,
        name: &str,
        value: Option<Expression>,
        resource: ResourceKind,
    ) -> VariableDecl {
        VariableDecl {
            uid: self.uid(),
            name: name.to_owned(),
            value,
            resource,
            location: TextLocation::default(),
        }
    }

    /// A global initialised to 0.
    pub(crate) fn counter(&mut self, name: &str) -> VariableDecl {
        let zero = self.num(0);
        self.variable(name, Some(zero))
    }

    pub(crate) fn constant(&mut self, name: &str, value: Option<Expression>) -> ConstantDecl {
        ConstantDecl {
            uid: self.uid(),
            name: name.to_owned(),
            value,
        }
    }

    /// `process (name = id)`
    pub(crate) fn process(
        &mut self,
        name: &str,
        id: i64,
        variables: Vec<VariableDecl>,
        body: Vec<Statement>,
    ) -> Process {
        let self_value = self.num(id);
        Process {
            uid: self.uid(),
            name: name.to_owned(),
            self_decl: self.uid(),
            self_value: ProcessSelf::Single(self_value),
            variables,
            body,
        }
    }

    /// `process (name \in low..high)`
    pub(crate) fn process_set(
        &mut self,
        name: &str,
        low: i64,
        high: i64,
        body: Vec<Statement>,
    ) -> Process {
        let low = self.num(low);
        let high = self.num(high);
        Process {
            uid: self.uid(),
            name: name.to_owned(),
            self_decl: self.uid(),
            self_value: ProcessSelf::Range { low, high },
            variables: Vec::new(),
            body,
        }
    }

    pub(crate) fn procedure(
        &mut self,
        name: &str,
        params: Vec<VariableDecl>,
        variables: Vec<VariableDecl>,
        body: Vec<Statement>,
    ) -> Procedure {
        Procedure {
            uid: self.uid(),
            name: name.to_owned(),
            params,
            variables,
            body,
        }
    }
}

pub(crate) fn algorithm(
    name: &str,
    variables: Vec<VariableDecl>,
    procedures: Vec<Procedure>,
    processes: Vec<Process>,
) -> Algorithm {
    Algorithm {
        name: name.to_owned(),
        constants: Vec::new(),
        variables,
        procedures,
        processes,
    }
}

pub(crate) fn resolve(algorithm: &Algorithm) -> DefinitionRegistry {
    resolve_algorithm(algorithm).expect("algorithm should resolve")
}

pub(crate) fn analyse(algorithm: &Algorithm) -> (DefinitionRegistry, AtomicityAnalysis) {
    let definitions = resolve(algorithm);
    let analysis = infer_atomicity(algorithm, &definitions).expect("atomicity inference should succeed");
    (definitions, analysis)
}

/// The label Uid with the given name, searching every process and procedure body.
pub(crate) fn label_uid(algorithm: &Algorithm, name: &str) -> Uid {
    let bodies = algorithm
        .processes
        .iter()
        .map(|process| &process.body)
        .chain(algorithm.procedures.iter().map(|procedure| &procedure.body));

    for body in bodies {
        if let Some(uid) = find_label(body, name) {
            return uid;
        }
    }

    panic!("no label named '{name}'");
}

fn find_label(statements: &[Statement], name: &str) -> Option<Uid> {
    statements.iter().find_map(|statement| match &statement.kind {
        StatementKind::LabeledStatements { label, statements } => {
            if label.name == name {
                Some(label.uid)
            } else {
                find_label(statements, name)
            }
        }
        StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
            find_label(body, name)
        }
        StatementKind::If { yes, no, .. } => find_label(yes, name).or_else(|| find_label(no, name)),
        StatementKind::Either { cases } => cases.iter().find_map(|case| find_label(case, name)),
        _ => None,
    })
}
