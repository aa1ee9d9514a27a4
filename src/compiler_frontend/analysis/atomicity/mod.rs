//! ============================================================
//!                     Atomicity Inference
//! ============================================================
//! Every label is one atomic step. This pass works out which global variables
//! each label touches and groups labels so that any two steps that could race
//! on the same variable are protected by the same lock.
//!
//! Order of work:
//!  1. List every label in declaration order (processes, then procedures)
//!  2. Run the access collector over each body, keeping only global variables
//!  3. Partition the labels into lock groups and fill the registry

pub mod access_collector;
pub mod lock_groups;
pub mod partition;

use crate::compiler_frontend::analysis::atomicity::access_collector::{
    AccessSink, collect_accesses,
};
use crate::compiler_frontend::analysis::atomicity::lock_groups::{LockGroupId, LockGroupRegistry};
use crate::compiler_frontend::analysis::atomicity::partition::{
    LabelAccesses, partition_into_lock_groups,
};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::compiler_warnings::{CompilerWarning, WarningKind};
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{Algorithm, Label, Statement, StatementKind, Uid};
use crate::compiler_frontend::pcal::tla_expressions::Expression;
use crate::{atomicity_log, return_compiler_error};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct AtomicityAnalysis {
    pub lock_groups: LockGroupRegistry,
    pub report: AtomicityReport,
    pub warnings: Vec<CompilerWarning>,
}

/// Summary of the inferred lock groups, printed by `pgo check`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AtomicityReport {
    pub algorithm: String,
    pub lock_groups: Vec<LockGroupReport>,

    /// Labels that touch no global variable and run without a lock
    pub unprotected_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LockGroupReport {
    pub id: LockGroupId,
    pub labels: Vec<String>,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

pub fn infer_atomicity(
    algorithm: &Algorithm,
    definitions: &DefinitionRegistry,
) -> Result<AtomicityAnalysis, CompilerError> {
    let mut sink = GlobalAccessSink {
        definitions,
        labels: Vec::new(),
        label_indexes: FxHashMap::default(),
    };

    let bodies = algorithm
        .processes
        .iter()
        .map(|process| (process.name.as_str(), &process.body))
        .chain(
            algorithm
                .procedures
                .iter()
                .map(|procedure| (procedure.name.as_str(), &procedure.body)),
        );

    for (owner, body) in bodies {
        atomicity_log!("Inferring atomicity for ", owner);
        sink.declare_labels(owner, body);
        collect_accesses(body, &mut sink)?;
    }

    let mut lock_groups = LockGroupRegistry::new();
    partition_into_lock_groups(&sink.labels, &mut lock_groups)?;

    let report = build_report(algorithm, definitions, &sink.labels, &lock_groups)?;
    let warnings = unused_global_warnings(definitions, &sink.labels);

    Ok(AtomicityAnalysis {
        lock_groups,
        report,
        warnings,
    })
}

/// Keeps only the accesses that touch global variables.
struct GlobalAccessSink<'a> {
    definitions: &'a DefinitionRegistry,
    labels: Vec<LabelAccesses>,
    label_indexes: FxHashMap<Uid, usize>,
}

impl GlobalAccessSink<'_> {
    fn declare_labels(&mut self, owner: &str, statements: &[Statement]) {
        for statement in statements {
            match &statement.kind {
                StatementKind::LabeledStatements { label, statements } => {
                    self.label_indexes.insert(label.uid, self.labels.len());
                    self.labels
                        .push(LabelAccesses::new(label.uid, format!("{owner}.{}", label.name)));
                    self.declare_labels(owner, statements);
                }
                StatementKind::While { body, .. } | StatementKind::With { body, .. } => {
                    self.declare_labels(owner, body);
                }
                StatementKind::If { yes, no, .. } => {
                    self.declare_labels(owner, yes);
                    self.declare_labels(owner, no);
                }
                StatementKind::Either { cases } => {
                    for case in cases {
                        self.declare_labels(owner, case);
                    }
                }
                _ => {}
            }
        }
    }

    fn accesses_for(&mut self, label: &Label) -> Result<&mut LabelAccesses, CompilerError> {
        match self.label_indexes.get(&label.uid) {
            Some(&index) => Ok(&mut self.labels[index]),
            None => return_compiler_error!("Access recorded for undeclared label '{}'", label.name),
        }
    }

    fn global_variables_in(&self, expression: &Expression) -> Result<Vec<Uid>, CompilerError> {
        let mut identifiers = Vec::new();
        expression.visit_identifiers(&mut |uid| identifiers.push(uid));

        let mut globals = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let declaration = self.definitions.follow_reference(identifier)?;
            if self.definitions.is_global_variable(declaration) {
                globals.push(declaration);
            }
        }

        Ok(globals)
    }
}

impl AccessSink for GlobalAccessSink<'_> {
    fn record_read(&mut self, expression: &Expression, label: &Label) -> Result<(), CompilerError> {
        let globals = self.global_variables_in(expression)?;
        self.accesses_for(label)?.reads.extend(globals);
        Ok(())
    }

    fn record_write(
        &mut self,
        expression: &Expression,
        label: &Label,
    ) -> Result<(), CompilerError> {
        let globals = self.global_variables_in(expression)?;
        self.accesses_for(label)?.writes.extend(globals);
        Ok(())
    }
}

fn build_report(
    algorithm: &Algorithm,
    definitions: &DefinitionRegistry,
    labels: &[LabelAccesses],
    lock_groups: &LockGroupRegistry,
) -> Result<AtomicityReport, CompilerError> {
    let variable_names = |variables: &BTreeSet<Uid>| -> Result<Vec<String>, CompilerError> {
        variables
            .iter()
            .map(|uid| definitions.definition(*uid).map(|d| d.name.to_owned()))
            .collect()
    };

    let mut groups: Vec<LockGroupReport> = Vec::new();
    let mut unprotected_labels = Vec::new();

    for accesses in labels {
        let Some(lock_group) = lock_groups.lock_group_or_default(accesses.label, None) else {
            unprotected_labels.push(accesses.name.to_owned());
            continue;
        };

        // Groups are numbered in label order, so a new group is always the next index
        if lock_group.index() == groups.len() {
            groups.push(LockGroupReport {
                id: lock_group,
                labels: Vec::new(),
                reads: variable_names(lock_groups.variable_reads_in_lock_group(lock_group))?,
                writes: variable_names(lock_groups.variable_writes_in_lock_group(lock_group))?,
            });
        }

        match groups.get_mut(lock_group.index()) {
            Some(group) => group.labels.push(accesses.name.to_owned()),
            None => return_compiler_error!(
                "Lock group {} was numbered out of order",
                lock_group
            ),
        }
    }

    Ok(AtomicityReport {
        algorithm: algorithm.name.to_owned(),
        lock_groups: groups,
        unprotected_labels,
    })
}

fn unused_global_warnings(
    definitions: &DefinitionRegistry,
    labels: &[LabelAccesses],
) -> Vec<CompilerWarning> {
    let accessed: BTreeSet<Uid> = labels
        .iter()
        .flat_map(|accesses| accesses.reads.iter().chain(&accesses.writes))
        .copied()
        .collect();

    definitions
        .global_variables()
        .filter(|variable| !accessed.contains(&variable.uid))
        .map(|variable| {
            CompilerWarning::new(
                &variable.name,
                variable.location,
                WarningKind::UnusedGlobalVariable,
            )
        })
        .collect()
}
