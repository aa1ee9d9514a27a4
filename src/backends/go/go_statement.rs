//! Lowers PlusCal statements into a Go function body.
//!
//! The tracker is threaded through every statement in program order. Branches work on
//! clones of it and are reconciled afterwards, so every path leaving a branch agrees
//! on which lock group is held.

use crate::backends::go::GoImports;
use crate::backends::go::critical_section_tracker::CriticalSectionTracker;
use crate::backends::go::go_block::{GoBlockBuilder, GoFunctionBody, GoLabelName, GoStatement};
use crate::backends::go::go_expr::lower_expression;
use crate::codegen_log;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{DONE_LABEL, Statement, StatementKind};
use crate::compiler_frontend::pcal::tla_expressions::Expression;
use crate::return_compiler_error;
use rustc_hash::FxHashSet;

pub struct BodyLowering<'a> {
    definitions: &'a DefinitionRegistry,
    imports: &'a mut GoImports,
    builder: GoBlockBuilder,
    next_temporary: usize,

    // Labels some goto in this function jumps to
    jump_targets: FxHashSet<String>,
}

impl<'a> BodyLowering<'a> {
    pub fn new(definitions: &'a DefinitionRegistry, imports: &'a mut GoImports) -> Self {
        Self {
            definitions,
            imports,
            builder: GoBlockBuilder::new(),
            next_temporary: 0,
            jump_targets: FxHashSet::default(),
        }
    }

    /// Lowers a whole process or procedure body.
    pub fn lower_function_body(
        &mut self,
        statements: &[Statement],
        tracker: &mut CriticalSectionTracker,
    ) -> Result<(), CompilerError> {
        collect_jump_targets(statements, &mut self.jump_targets);
        self.lower_statements(statements, tracker)
    }

    pub fn builder(&mut self) -> &mut GoBlockBuilder {
        &mut self.builder
    }

    pub fn finish(self) -> Result<GoFunctionBody, CompilerError> {
        self.builder.finish()
    }

    pub fn expression(&self, expression: &Expression) -> Result<String, CompilerError> {
        lower_expression(expression, self.definitions)
    }

    pub fn lower_statements(
        &mut self,
        statements: &[Statement],
        tracker: &mut CriticalSectionTracker,
    ) -> Result<(), CompilerError> {
        for statement in statements {
            self.lower_statement(statement, tracker)?;
        }
        Ok(())
    }

    fn lower_statement(
        &mut self,
        statement: &Statement,
        tracker: &mut CriticalSectionTracker,
    ) -> Result<(), CompilerError> {
        match &statement.kind {
            StatementKind::LabeledStatements { label, statements } => {
                codegen_log!("Label ", label.name);
                let name = GoLabelName::new(&label.name);

                // A jump arrives holding nothing, so falling through has to arrive the same way
                if self.jump_targets.contains(&label.name) {
                    tracker.end(&mut self.builder);
                }

                self.builder.declare_label(&name)?;
                tracker.start(&mut self.builder, label.uid, &name)?;
                self.lower_statements(statements, tracker)?;
            }

            StatementKind::While { condition, body } => {
                let condition = self.expression(condition)?;
                let loop_entry = tracker.clone();
                let loop_end = tracker.action_at_loop_end();

                self.builder.open_block();
                self.builder.add_statement(GoStatement::If {
                    condition: format!("!{condition}"),
                    yes: vec![GoStatement::Line("break".to_owned())],
                    no: Vec::new(),
                });
                self.lower_statements(body, tracker)?;
                loop_end.apply(tracker, &mut self.builder)?;
                let body = self.builder.close_block()?;

                self.builder.add_statement(GoStatement::For(body));

                // The loop exits through the condition check, so it leaves in the entry state
                tracker.check_compatibility(&loop_entry)?;
            }

            StatementKind::If { condition, yes, no } => {
                let condition = self.expression(condition)?;
                let close_sections = yes.iter().chain(no).any(Statement::transfers_control);

                let (yes, yes_tracker) = self.lower_branch(yes, tracker, close_sections)?;
                let (no, no_tracker) = self.lower_branch(no, tracker, close_sections)?;
                yes_tracker.check_compatibility(&no_tracker)?;
                *tracker = yes_tracker;

                self.builder
                    .add_statement(GoStatement::If { condition, yes, no });
            }

            StatementKind::Either { cases } => {
                let close_sections = cases.iter().flatten().any(Statement::transfers_control);

                let mut lowered_cases = Vec::with_capacity(cases.len());
                let mut case_trackers: Vec<CriticalSectionTracker> = Vec::with_capacity(cases.len());
                for case in cases {
                    let (lowered, case_tracker) =
                        self.lower_branch(case, tracker, close_sections)?;
                    if let Some(first) = case_trackers.first() {
                        first.check_compatibility(&case_tracker)?;
                    }
                    lowered_cases.push(lowered);
                    case_trackers.push(case_tracker);
                }

                if let Some(first) = case_trackers.into_iter().next() {
                    *tracker = first;
                }

                self.imports.rand = true;
                self.builder.add_statement(GoStatement::Switch {
                    subject: format!("rand.Intn({})", cases.len()),
                    cases: lowered_cases,
                });
            }

            StatementKind::Assignment { pairs } => {
                let mut targets = Vec::with_capacity(pairs.len());
                let mut values = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    targets.push(self.expression(&pair.lhs)?);
                    values.push(self.expression(&pair.rhs)?);
                }

                if pairs.len() == 1 {
                    self.builder
                        .add_line(format!("{} = {}", targets[0], values[0]));
                } else {
                    // Every right side sees the values from before the assignment
                    let mut block = Vec::with_capacity(pairs.len() * 2);
                    let mut temporaries = Vec::with_capacity(pairs.len());
                    for value in values {
                        let temporary = format!("pgoTmp{}", self.next_temporary);
                        self.next_temporary += 1;
                        block.push(GoStatement::Line(format!("{temporary} := {value}")));
                        temporaries.push(temporary);
                    }
                    for (target, temporary) in targets.iter().zip(&temporaries) {
                        block.push(GoStatement::Line(format!("{target} = {temporary}")));
                    }
                    self.builder.add_statement(GoStatement::Block(block));
                }
            }

            StatementKind::Return => {
                tracker.end(&mut self.builder);
                self.builder.add_line("return");
            }

            StatementKind::Skip => {}

            StatementKind::Call { target, arguments } => {
                let mut rendered = vec!["self".to_owned()];
                for argument in arguments {
                    rendered.push(self.expression(argument)?);
                }

                tracker.end(&mut self.builder);
                self.builder
                    .add_line(format!("{target}({})", rendered.join(", ")));
            }

            StatementKind::MacroCall { target, .. } => {
                return_compiler_error!(
                    "Macro call '{}' reached Go code generation",
                    target;
                    {
                        CompilationStage => "Go Codegen",
                    }
                );
            }

            StatementKind::With { variables, body } => {
                self.builder.open_block();
                for variable in variables {
                    let Some(value) = &variable.value else {
                        return_compiler_error!(
                            "'with' binding '{}' reached code generation without a value",
                            variable.name
                        );
                    };
                    let value = self.expression(value)?;
                    self.builder.add_line(format!("{} := {value}", variable.name));
                    self.builder.add_line(format!("_ = {}", variable.name));
                }
                self.lower_statements(body, tracker)?;
                let block = self.builder.close_block()?;
                self.builder.add_statement(GoStatement::Block(block));
            }

            StatementKind::Print(value) => {
                let value = self.expression(value)?;
                self.imports.fmt = true;
                self.builder.add_line(format!("fmt.Println({value})"));
            }

            StatementKind::Assert(value) => {
                let condition = self.expression(value)?;
                let message = format!("assertion failed: {condition}");
                self.builder.add_statement(GoStatement::If {
                    condition: format!("!{condition}"),
                    yes: vec![GoStatement::Line(format!("panic({message:?})"))],
                    no: Vec::new(),
                });
            }

            StatementKind::Await(value) => {
                let condition = self.expression(value)?;

                // Only the retry path gives up the step. The fallthrough path keeps going.
                let mut retry = tracker.clone();
                self.builder.open_block();
                retry.abort(&mut self.builder)?;
                let block = self.builder.close_block()?;

                self.builder.add_statement(GoStatement::If {
                    condition: format!("!{condition}"),
                    yes: block,
                    no: Vec::new(),
                });
            }

            StatementKind::Goto(target) => {
                tracker.end(&mut self.builder);
                if target == DONE_LABEL {
                    self.builder.add_line("return");
                } else {
                    self.builder.go_to(&GoLabelName::new(target));
                }
            }
        }

        Ok(())
    }

    fn lower_branch<'t>(
        &mut self,
        statements: &[Statement],
        tracker: &CriticalSectionTracker<'t>,
        close_sections: bool,
    ) -> Result<(Vec<GoStatement>, CriticalSectionTracker<'t>), CompilerError> {
        let mut branch_tracker = tracker.clone();

        self.builder.open_block();
        self.lower_statements(statements, &mut branch_tracker)?;
        if close_sections {
            branch_tracker.end(&mut self.builder);
        }
        let block = self.builder.close_block()?;

        Ok((block, branch_tracker))
    }
}

fn collect_jump_targets(statements: &[Statement], targets: &mut FxHashSet<String>) {
    for statement in statements {
        match &statement.kind {
            StatementKind::Goto(target) => {
                targets.insert(target.to_owned());
            }
            StatementKind::LabeledStatements { statements, .. } => {
                collect_jump_targets(statements, targets);
            }
            StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                collect_jump_targets(body, targets);
            }
            StatementKind::If { yes, no, .. } => {
                collect_jump_targets(yes, targets);
                collect_jump_targets(no, targets);
            }
            StatementKind::Either { cases } => {
                for case in cases {
                    collect_jump_targets(case, targets);
                }
            }
            _ => {}
        }
    }
}
