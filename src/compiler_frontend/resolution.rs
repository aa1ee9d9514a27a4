//! ============================================================
//!                     Name Resolution
//! ============================================================
//! Walks the algorithm once, registering every declaration and pointing every
//! identifier expression at the declaration it names.
//!
//! Scoping follows PlusCal:
//!  - constants and global variables are visible everywhere
//!  - process locals and `self` are visible inside their process
//!  - procedure parameters and locals are visible inside their procedure
//!  - `with` bindings are visible in the `with` body, each one after its own initializer
//!
//! Label checks also live here because they need the same per-body view:
//! duplicate label names and `goto` targets that don't exist are rule errors.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::{Definition, DefinitionKind, DefinitionRegistry};
use crate::compiler_frontend::pcal::pcal_nodes::{
    Algorithm, DONE_LABEL, ProcessSelf, Statement, StatementKind, TextLocation, Uid, VariableDecl,
};
use crate::compiler_frontend::pcal::tla_expressions::{Expression, ExpressionKind};
use crate::{resolve_log, return_compiler_error, return_rule_error};
use rustc_hash::{FxHashMap, FxHashSet};

pub fn resolve_algorithm(algorithm: &Algorithm) -> Result<DefinitionRegistry, CompilerError> {
    check_unique_uids(algorithm)?;

    let mut resolver = Resolver {
        registry: DefinitionRegistry::new(),
        scopes: vec![FxHashMap::default()],
        procedure_arity: algorithm
            .procedures
            .iter()
            .map(|p| (p.name.as_str(), p.params.len()))
            .collect(),
    };

    for constant in &algorithm.constants {
        if let Some(value) = &constant.value {
            resolver.resolve_expression(value, TextLocation::default())?;
        }
        resolver.declare(
            constant.uid,
            &constant.name,
            DefinitionKind::Constant,
            TextLocation::default(),
        )?;
    }

    for variable in &algorithm.variables {
        resolver.declare_variable(variable, DefinitionKind::GlobalVariable(variable.resource))?;
    }

    for procedure in &algorithm.procedures {
        resolve_log!("Resolving procedure ", procedure.name);
        resolver.scopes.push(FxHashMap::default());

        for param in &procedure.params {
            resolver.declare_variable(param, DefinitionKind::Parameter(param.resource))?;
        }
        for variable in &procedure.variables {
            resolver.declare_variable(variable, DefinitionKind::LocalVariable(variable.resource))?;
        }

        check_labels(&procedure.body)?;
        resolver.resolve_statements(&procedure.body)?;
        resolver.scopes.pop();
    }

    for process in &algorithm.processes {
        resolve_log!("Resolving process ", process.name);

        // The self value is evaluated before the process exists
        match &process.self_value {
            ProcessSelf::Single(value) => resolver.resolve_expression(value, TextLocation::default())?,
            ProcessSelf::Range { low, high } => {
                resolver.resolve_expression(low, TextLocation::default())?;
                resolver.resolve_expression(high, TextLocation::default())?;
            }
        }

        resolver.scopes.push(FxHashMap::default());
        resolver.declare(
            process.self_decl,
            "self",
            DefinitionKind::ProcessSelf,
            TextLocation::default(),
        )?;

        for variable in &process.variables {
            resolver.declare_variable(variable, DefinitionKind::LocalVariable(variable.resource))?;
        }

        check_labels(&process.body)?;
        resolver.resolve_statements(&process.body)?;
        resolver.scopes.pop();
    }

    Ok(resolver.registry)
}

struct Resolver<'a> {
    registry: DefinitionRegistry,
    scopes: Vec<FxHashMap<String, Uid>>,
    procedure_arity: FxHashMap<&'a str, usize>,
}

impl Resolver<'_> {
    fn declare(
        &mut self,
        uid: Uid,
        name: &str,
        kind: DefinitionKind,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        let Some(scope) = self.scopes.last_mut() else {
            return_compiler_error!("Declared '{}' with no open scope", name);
        };

        if scope.contains_key(name) {
            return_rule_error!(
                format!("'{name}' is already declared in this scope"),
                location
            );
        }

        scope.insert(name.to_owned(), uid);
        self.registry.add_definition(Definition {
            uid,
            name: name.to_owned(),
            kind,
            location,
        })
    }

    fn declare_variable(
        &mut self,
        variable: &VariableDecl,
        kind: DefinitionKind,
    ) -> Result<(), CompilerError> {
        if let Some(value) = &variable.value {
            self.resolve_expression(value, variable.location)?;
        }
        self.declare(variable.uid, &variable.name, kind, variable.location)
    }

    fn lookup(&self, name: &str) -> Option<Uid> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn resolve_statements(&mut self, statements: &[Statement]) -> Result<(), CompilerError> {
        for statement in statements {
            self.resolve_statement(statement)?;
        }
        Ok(())
    }

    fn resolve_statement(&mut self, statement: &Statement) -> Result<(), CompilerError> {
        let location = statement.location;

        match &statement.kind {
            StatementKind::LabeledStatements { statements, .. } => {
                self.resolve_statements(statements)?;
            }

            StatementKind::While { condition, body } => {
                self.resolve_expression(condition, location)?;
                self.resolve_statements(body)?;
            }

            StatementKind::If { condition, yes, no } => {
                self.resolve_expression(condition, location)?;
                self.resolve_statements(yes)?;
                self.resolve_statements(no)?;
            }

            StatementKind::Either { cases } => {
                if cases.is_empty() {
                    return_rule_error!("'either' needs at least one branch", location);
                }
                for case in cases {
                    self.resolve_statements(case)?;
                }
            }

            StatementKind::Assignment { pairs } => {
                for pair in pairs {
                    if assignment_root(&pair.lhs).is_none() {
                        return_rule_error!(
                            "Left side of an assignment must be a variable or an indexed variable",
                            location
                        );
                    }
                    self.resolve_expression(&pair.lhs, location)?;
                    self.resolve_expression(&pair.rhs, location)?;
                }
            }

            StatementKind::Call { target, arguments } => {
                let Some(&arity) = self.procedure_arity.get(target.as_str()) else {
                    return_rule_error!(
                        format!("Call to undeclared procedure '{target}'"),
                        location
                    );
                };
                if arity != arguments.len() {
                    return_rule_error!(
                        format!(
                            "Procedure '{target}' takes {arity} arguments but was called with {}",
                            arguments.len()
                        ),
                        location
                    );
                }
                for argument in arguments {
                    self.resolve_expression(argument, location)?;
                }
            }

            StatementKind::MacroCall { target, .. } => {
                return_compiler_error!(
                    "Macro call '{}' reached resolution, macros should already be expanded",
                    target;
                    {
                        CompilationStage => "Resolution",
                    }
                );
            }

            StatementKind::With { variables, body } => {
                self.scopes.push(FxHashMap::default());
                for variable in variables {
                    if variable.value.is_none() {
                        return_rule_error!(
                            format!("'with' binding '{}' needs a value", variable.name),
                            variable.location
                        );
                    }
                    self.declare_variable(variable, DefinitionKind::BoundVariable)?;
                }
                self.resolve_statements(body)?;
                self.scopes.pop();
            }

            StatementKind::Print(value)
            | StatementKind::Assert(value)
            | StatementKind::Await(value) => {
                self.resolve_expression(value, location)?;
            }

            StatementKind::Return | StatementKind::Skip | StatementKind::Goto(_) => {}
        }

        Ok(())
    }

    fn resolve_expression(
        &mut self,
        expression: &Expression,
        location: TextLocation,
    ) -> Result<(), CompilerError> {
        match &expression.kind {
            ExpressionKind::Identifier(name) => match self.lookup(name) {
                Some(declaration) => {
                    resolve_log!("  ", name, " ", expression.uid, " -> ", declaration);
                    self.registry.add_reference(expression.uid, declaration);
                }
                None => {
                    return_rule_error!(format!("Unknown identifier '{name}'"), location, {
                        PrimarySuggestion => "Declare it as a variable, constant or procedure parameter",
                    });
                }
            },

            ExpressionKind::Number(_) | ExpressionKind::Bool(_) | ExpressionKind::String(_) => {}

            ExpressionKind::FunctionCall { function, params } => {
                self.resolve_expression(function, location)?;
                for param in params {
                    self.resolve_expression(param, location)?;
                }
            }

            ExpressionKind::BinOp { lhs, rhs, .. } => {
                self.resolve_expression(lhs, location)?;
                self.resolve_expression(rhs, location)?;
            }

            ExpressionKind::Unary { operand, .. } => self.resolve_expression(operand, location)?,

            ExpressionKind::Tuple(elements) => {
                for element in elements {
                    self.resolve_expression(element, location)?;
                }
            }

            ExpressionKind::If {
                condition,
                yes,
                no,
            } => {
                self.resolve_expression(condition, location)?;
                self.resolve_expression(yes, location)?;
                self.resolve_expression(no, location)?;
            }

            // Operator names belong to the TLA+ standard modules, not to the algorithm
            ExpressionKind::OperatorCall { args, .. } => {
                for arg in args {
                    self.resolve_expression(arg, location)?;
                }
            }
        }

        Ok(())
    }
}

/// The variable an assignment writes to: `x` for `x`, `x[i]` or `x[i][j]`.
pub fn assignment_root(lhs: &Expression) -> Option<&Expression> {
    match &lhs.kind {
        ExpressionKind::Identifier(_) => Some(lhs),
        ExpressionKind::FunctionCall { function, .. } => assignment_root(function),
        _ => None,
    }
}

fn check_unique_uids(algorithm: &Algorithm) -> Result<(), CompilerError> {
    let mut seen = FxHashSet::default();
    let mut duplicate = None;

    algorithm.for_each_uid(|uid| {
        if !seen.insert(uid) && duplicate.is_none() {
            duplicate = Some(uid);
        }
    });

    if let Some(uid) = duplicate {
        return_compiler_error!(
            "Uid {} is attached to more than one node",
            uid;
            {
                CompilationStage => "Resolution",
            }
        );
    }

    Ok(())
}

/// Label names are unique per process or procedure, and every goto must land on one of them.
/// Code that can only be reached after control left the current step has to start a new label.
fn check_labels(body: &[Statement]) -> Result<(), CompilerError> {
    let mut labels = FxHashSet::default();
    collect_label_names(body, &mut labels)?;
    check_goto_targets(body, &labels)?;
    check_label_placement(body)
}

// A call, return or goto leaves the step, as does any branch that contains one or a label.
// Loops are left out: their exit is the condition check, which is still inside the loop's step.
fn needs_label_after(statement: &Statement) -> bool {
    match &statement.kind {
        StatementKind::Return
        | StatementKind::Call { .. }
        | StatementKind::MacroCall { .. }
        | StatementKind::Goto(_) => true,
        StatementKind::If { .. } | StatementKind::Either { .. } | StatementKind::With { .. } => {
            statement.transfers_control()
        }
        StatementKind::LabeledStatements { statements, .. } => {
            statements.last().is_some_and(needs_label_after)
        }
        _ => false,
    }
}

fn check_label_placement(statements: &[Statement]) -> Result<(), CompilerError> {
    for pair in statements.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if needs_label_after(previous)
            && !matches!(next.kind, StatementKind::LabeledStatements { .. })
        {
            return_rule_error!(
                "This statement runs after control has left the current step, so it needs a label",
                next.location,
                {
                    PrimarySuggestion => "Add a label before this statement",
                }
            );
        }
    }

    for statement in statements {
        match &statement.kind {
            StatementKind::LabeledStatements { statements, .. } => {
                check_label_placement(statements)?;
            }
            StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                check_label_placement(body)?;
            }
            StatementKind::If { yes, no, .. } => {
                check_label_placement(yes)?;
                check_label_placement(no)?;
            }
            StatementKind::Either { cases } => {
                for case in cases {
                    check_label_placement(case)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn collect_label_names<'a>(
    statements: &'a [Statement],
    labels: &mut FxHashSet<&'a str>,
) -> Result<(), CompilerError> {
    for statement in statements {
        match &statement.kind {
            StatementKind::LabeledStatements { label, statements } => {
                if label.name == DONE_LABEL {
                    return_rule_error!(
                        format!("'{DONE_LABEL}' is reserved and can't be used as a label"),
                        statement.location
                    );
                }
                if !labels.insert(label.name.as_str()) {
                    return_rule_error!(
                        format!("Label '{}' is declared more than once", label.name),
                        statement.location
                    );
                }
                collect_label_names(statements, labels)?;
            }
            StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                collect_label_names(body, labels)?;
            }
            StatementKind::If { yes, no, .. } => {
                collect_label_names(yes, labels)?;
                collect_label_names(no, labels)?;
            }
            StatementKind::Either { cases } => {
                for case in cases {
                    collect_label_names(case, labels)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_goto_targets(
    statements: &[Statement],
    labels: &FxHashSet<&str>,
) -> Result<(), CompilerError> {
    for statement in statements {
        match &statement.kind {
            StatementKind::Goto(target) => {
                if target != DONE_LABEL && !labels.contains(target.as_str()) {
                    return_rule_error!(
                        format!("goto target '{target}' does not exist"),
                        statement.location,
                        {
                            PrimarySuggestion => "Check the label name for typos",
                            AlternativeSuggestion => "Use 'goto Done' to finish the process or procedure",
                        }
                    );
                }
            }
            StatementKind::LabeledStatements { statements, .. } => {
                check_goto_targets(statements, labels)?;
            }
            StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                check_goto_targets(body, labels)?;
            }
            StatementKind::If { yes, no, .. } => {
                check_goto_targets(yes, labels)?;
                check_goto_targets(no, labels)?;
            }
            StatementKind::Either { cases } => {
                for case in cases {
                    check_goto_targets(case, labels)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/resolution_tests.rs"]
mod tests;
