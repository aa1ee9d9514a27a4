//! Splits labels into lock groups.
//!
//! Two labels conflict when one of them writes a global variable the other reads or
//! writes. Conflicting labels are merged with a union-find, so every variable that is
//! ever written ends up protected by exactly one group. Groups are then numbered by
//! the first label (in declaration order) that belongs to them.

use crate::atomicity_log;
use crate::compiler_frontend::analysis::atomicity::lock_groups::{LockGroupId, LockGroupRegistry};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::pcal::pcal_nodes::Uid;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// The global variables one label touches.
#[derive(Debug, Clone)]
pub struct LabelAccesses {
    pub label: Uid,
    pub name: String,
    pub reads: BTreeSet<Uid>,
    pub writes: BTreeSet<Uid>,
}

impl LabelAccesses {
    pub fn new(label: Uid, name: impl Into<String>) -> Self {
        Self {
            label,
            name: name.into(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
        }
    }

    pub fn touches_globals(&self) -> bool {
        !self.reads.is_empty() || !self.writes.is_empty()
    }
}

struct UnionFind {
    parents: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parents: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parents[node] != node {
            self.parents[node] = self.parents[self.parents[node]];
            node = self.parents[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Lower index wins so the structure doesn't depend on merge order
            let (root, child) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parents[child] = root;
        }
    }
}

/// Assigns every label that touches a global variable to a lock group.
/// `labels` must be in declaration order.
pub fn partition_into_lock_groups(
    labels: &[LabelAccesses],
    registry: &mut LockGroupRegistry,
) -> Result<(), CompilerError> {
    let mut sets = UnionFind::new(labels.len());

    // Per variable, the first label writing it. Every other accessor joins that label.
    let mut first_writer: FxHashMap<Uid, usize> = FxHashMap::default();
    for (index, accesses) in labels.iter().enumerate() {
        for variable in &accesses.writes {
            match first_writer.get(variable) {
                Some(&writer) => sets.union(writer, index),
                None => {
                    first_writer.insert(*variable, index);
                }
            }
        }
    }

    for (index, accesses) in labels.iter().enumerate() {
        for variable in &accesses.reads {
            if let Some(&writer) = first_writer.get(variable) {
                sets.union(writer, index);
            }
        }
    }

    let mut numbering: FxHashMap<usize, LockGroupId> = FxHashMap::default();
    for (index, accesses) in labels.iter().enumerate() {
        if !accesses.touches_globals() {
            atomicity_log!("Label ", accesses.name, " needs no lock");
            continue;
        }

        let root = sets.find(index);
        let next_id = LockGroupId(numbering.len() as u32);
        let lock_group = *numbering.entry(root).or_insert(next_id);

        atomicity_log!("Label ", accesses.name, " -> lock group ", lock_group);

        registry.add_label_to_lock_group(accesses.label, lock_group)?;
        for variable in &accesses.reads {
            registry.add_variable_read_to_lock_group(lock_group, *variable);
        }
        for variable in &accesses.writes {
            registry.add_variable_write_to_lock_group(lock_group, *variable);
        }
    }

    Ok(())
}
