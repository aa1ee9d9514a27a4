//! A small statement tree for one Go function body.
//!
//! Statements are appended to the innermost open block. Nested blocks (if / for /
//! switch bodies) are opened, filled, closed, then attached by the caller.
//!
//! Go refuses to compile a label that nothing jumps to, so labels are kept in the
//! tree and only rendered if some `goto` targets them.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::return_compiler_error;
use rustc_hash::FxHashSet;
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoLabelName(pub String);

impl GoLabelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for GoLabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoStatement {
    /// A single line of Go, already rendered
    Line(String),
    Label(GoLabelName),
    Goto(GoLabelName),
    If {
        condition: String,
        yes: Vec<GoStatement>,
        no: Vec<GoStatement>,
    },
    For(Vec<GoStatement>),
    Switch {
        subject: String,
        cases: Vec<Vec<GoStatement>>,
    },
    Block(Vec<GoStatement>),
}

#[derive(Debug)]
pub struct GoBlockBuilder {
    blocks: Vec<Vec<GoStatement>>,
    declared_labels: FxHashSet<GoLabelName>,
    jump_targets: FxHashSet<GoLabelName>,
}

impl Default for GoBlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GoBlockBuilder {
    pub fn new() -> Self {
        Self {
            blocks: vec![Vec::new()],
            declared_labels: FxHashSet::default(),
            jump_targets: FxHashSet::default(),
        }
    }

    pub fn add_statement(&mut self, statement: GoStatement) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(statement);
        }
    }

    pub fn add_line(&mut self, line: impl Into<String>) {
        self.add_statement(GoStatement::Line(line.into()));
    }

    pub fn open_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub fn close_block(&mut self) -> Result<Vec<GoStatement>, CompilerError> {
        // The function body itself is never closed this way
        if self.blocks.len() < 2 {
            return_compiler_error!("Closed a Go block that was never opened");
        }

        match self.blocks.pop() {
            Some(block) => Ok(block),
            None => return_compiler_error!("Go block stack is empty"),
        }
    }

    /// Every label can be declared once per function.
    pub fn declare_label(&mut self, name: &GoLabelName) -> Result<(), CompilerError> {
        if !self.declared_labels.insert(name.to_owned()) {
            return_compiler_error!(
                "Go label '{}' declared more than once in the same function",
                name;
                {
                    CompilationStage => "Go Codegen",
                }
            );
        }

        self.add_statement(GoStatement::Label(name.to_owned()));
        Ok(())
    }

    /// Makes sure a label a critical section may jump back to exists in this function.
    pub fn ensure_label_declared(&self, name: &GoLabelName) -> Result<(), CompilerError> {
        if !self.declared_labels.contains(name) {
            return_compiler_error!(
                "Critical section started for label '{}' before the label was declared",
                name;
                {
                    CompilationStage => "Go Codegen",
                }
            );
        }
        Ok(())
    }

    pub fn go_to(&mut self, name: &GoLabelName) {
        self.jump_targets.insert(name.to_owned());
        self.add_statement(GoStatement::Goto(name.to_owned()));
    }

    /// Closes the function body. Every jump must land on a declared label.
    pub fn finish(mut self) -> Result<GoFunctionBody, CompilerError> {
        if self.blocks.len() != 1 {
            return_compiler_error!(
                "Go function finished with {} unclosed blocks",
                self.blocks.len() - 1
            );
        }

        let mut missing: Vec<&GoLabelName> = self
            .jump_targets
            .iter()
            .filter(|target| !self.declared_labels.contains(*target))
            .collect();
        missing.sort_by(|a, b| a.0.cmp(&b.0));

        if let Some(target) = missing.first() {
            return_compiler_error!("goto '{}' has no matching label", target);
        }

        Ok(GoFunctionBody {
            statements: self.blocks.pop().unwrap_or_default(),
            jump_targets: self.jump_targets,
        })
    }
}

#[derive(Debug)]
pub struct GoFunctionBody {
    pub statements: Vec<GoStatement>,
    jump_targets: FxHashSet<GoLabelName>,
}

impl GoFunctionBody {
    pub fn render(&self, indent: usize) -> String {
        let mut out = String::new();
        self.render_block(&self.statements, indent, &mut out);
        out
    }

    fn render_block(&self, statements: &[GoStatement], indent: usize, out: &mut String) {
        let pad = "\t".repeat(indent);

        for (index, statement) in statements.iter().enumerate() {
            match statement {
                GoStatement::Line(line) => {
                    let _ = writeln!(out, "{pad}{line}");
                }

                GoStatement::Label(name) => {
                    if !self.jump_targets.contains(name) {
                        continue;
                    }

                    // A Go label must be followed by a statement
                    if index + 1 == statements.len() {
                        let _ = writeln!(out, "{name}: {{}}");
                    } else {
                        let _ = writeln!(out, "{name}:");
                    }
                }

                GoStatement::Goto(name) => {
                    let _ = writeln!(out, "{pad}goto {name}");
                }

                GoStatement::If { condition, yes, no } => {
                    let _ = writeln!(out, "{pad}if {condition} {{");
                    self.render_block(yes, indent + 1, out);
                    if no.is_empty() {
                        let _ = writeln!(out, "{pad}}}");
                    } else {
                        let _ = writeln!(out, "{pad}}} else {{");
                        self.render_block(no, indent + 1, out);
                        let _ = writeln!(out, "{pad}}}");
                    }
                }

                GoStatement::For(body) => {
                    let _ = writeln!(out, "{pad}for {{");
                    self.render_block(body, indent + 1, out);
                    let _ = writeln!(out, "{pad}}}");
                }

                GoStatement::Switch { subject, cases } => {
                    let _ = writeln!(out, "{pad}switch {subject} {{");
                    for (case_index, case) in cases.iter().enumerate() {
                        let _ = writeln!(out, "{pad}case {case_index}:");
                        self.render_block(case, indent + 1, out);
                    }
                    let _ = writeln!(out, "{pad}}}");
                }

                GoStatement::Block(body) => {
                    let _ = writeln!(out, "{pad}{{");
                    self.render_block(body, indent + 1, out);
                    let _ = writeln!(out, "{pad}}}");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/go_block_tests.rs"]
mod tests;
