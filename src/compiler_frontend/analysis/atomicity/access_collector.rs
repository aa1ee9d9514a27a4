//! Finds every read and write a label performs.
//!
//! The collector only reports candidate accesses. Whether an expression names a
//! shared resource is the sink's business, so a sink can do a dry run without
//! touching the lock-group registry.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::pcal::pcal_nodes::{Label, Statement, StatementKind};
use crate::compiler_frontend::pcal::tla_expressions::{Expression, ExpressionKind};
use crate::{atomicity_log, return_compiler_error};

pub trait AccessSink {
    fn record_read(&mut self, expression: &Expression, label: &Label) -> Result<(), CompilerError>;

    /// `expression` is always the root variable being written, never an indexed access.
    fn record_write(&mut self, expression: &Expression, label: &Label)
    -> Result<(), CompilerError>;
}

/// Walks a process or procedure body, reporting accesses under the label that contains them.
pub fn collect_accesses(
    body: &[Statement],
    sink: &mut impl AccessSink,
) -> Result<(), CompilerError> {
    collect_statements(body, None, sink)
}

fn collect_statements(
    statements: &[Statement],
    current_label: Option<&Label>,
    sink: &mut impl AccessSink,
) -> Result<(), CompilerError> {
    for statement in statements {
        collect_statement(statement, current_label, sink)?;
    }
    Ok(())
}

fn collect_statement(
    statement: &Statement,
    current_label: Option<&Label>,
    sink: &mut impl AccessSink,
) -> Result<(), CompilerError> {
    // A label starts a new atomic step for everything inside it
    if let StatementKind::LabeledStatements { label, statements } = &statement.kind {
        atomicity_log!("Collecting accesses for label ", label.name);
        return collect_statements(statements, Some(label), sink);
    }

    let Some(label) = current_label else {
        return_compiler_error!(
            "Statement {} is not inside any label",
            statement.uid;
            {
                CompilationStage => "Atomicity Inference",
            }
        );
    };

    match &statement.kind {
        StatementKind::LabeledStatements { .. } => {}

        StatementKind::While { condition, body } => {
            sink.record_read(condition, label)?;
            collect_statements(body, current_label, sink)?;
        }

        StatementKind::If { condition, yes, no } => {
            sink.record_read(condition, label)?;
            collect_statements(yes, current_label, sink)?;
            collect_statements(no, current_label, sink)?;
        }

        StatementKind::Either { cases } => {
            for case in cases {
                collect_statements(case, current_label, sink)?;
            }
        }

        StatementKind::Assignment { pairs } => {
            for pair in pairs {
                record_assignment_target(&pair.lhs, label, sink)?;
                sink.record_read(&pair.rhs, label)?;
            }
        }

        StatementKind::Call { arguments, .. } => {
            for argument in arguments {
                sink.record_read(argument, label)?;
            }
        }

        StatementKind::MacroCall { target, .. } => {
            return_compiler_error!(
                "Macro call '{}' found during atomicity inference, macros should already be expanded",
                target;
                {
                    CompilationStage => "Atomicity Inference",
                }
            );
        }

        StatementKind::With { variables, body } => {
            for variable in variables {
                if let Some(value) = &variable.value {
                    sink.record_read(value, label)?;
                }
            }
            collect_statements(body, current_label, sink)?;
        }

        StatementKind::Print(value)
        | StatementKind::Assert(value)
        | StatementKind::Await(value) => {
            sink.record_read(value, label)?;
        }

        StatementKind::Return | StatementKind::Skip | StatementKind::Goto(_) => {}
    }

    Ok(())
}

// x[i][j] := ... writes x and reads i and j
fn record_assignment_target(
    lhs: &Expression,
    label: &Label,
    sink: &mut impl AccessSink,
) -> Result<(), CompilerError> {
    match &lhs.kind {
        ExpressionKind::Identifier(_) => sink.record_write(lhs, label),

        ExpressionKind::FunctionCall { function, params } => {
            for param in params {
                sink.record_read(param, label)?;
            }
            record_assignment_target(function, label, sink)
        }

        _ => return_compiler_error!(
            "Assignment target {} is not a variable or an indexed variable",
            lhs.uid
        ),
    }
}
