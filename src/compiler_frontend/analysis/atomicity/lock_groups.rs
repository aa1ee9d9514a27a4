use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::pcal::pcal_nodes::Uid;
use crate::return_compiler_error;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LockGroupId(pub u32);

impl LockGroupId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LockGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NO_VARIABLES: BTreeSet<Uid> = BTreeSet::new();

/// Which lock group protects each label, and what each group reads and writes.
///
/// Written once by atomicity inference, then only read by code generation.
#[derive(Debug, Default)]
pub struct LockGroupRegistry {
    label_groups: FxHashMap<Uid, LockGroupId>,
    reads: FxHashMap<LockGroupId, BTreeSet<Uid>>,
    writes: FxHashMap<LockGroupId, BTreeSet<Uid>>,
}

impl LockGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A label's group can only be assigned once.
    pub fn add_label_to_lock_group(
        &mut self,
        label: Uid,
        lock_group: LockGroupId,
    ) -> Result<(), CompilerError> {
        if let Some(existing) = self.label_groups.get(&label) {
            return_compiler_error!(
                "Label {} is already in lock group {}, can't move it to lock group {}",
                label,
                existing,
                lock_group;
                {
                    CompilationStage => "Atomicity Inference",
                }
            );
        }

        self.label_groups.insert(label, lock_group);
        Ok(())
    }

    pub fn lock_group(&self, label: Uid) -> Result<LockGroupId, CompilerError> {
        match self.label_groups.get(&label) {
            Some(lock_group) => Ok(*lock_group),
            None => return_compiler_error!("Label {} was never assigned a lock group", label),
        }
    }

    pub fn lock_group_or_default(
        &self,
        label: Uid,
        fallback: Option<LockGroupId>,
    ) -> Option<LockGroupId> {
        self.label_groups.get(&label).copied().or(fallback)
    }

    pub fn add_variable_read_to_lock_group(&mut self, lock_group: LockGroupId, variable: Uid) {
        self.reads.entry(lock_group).or_default().insert(variable);
    }

    pub fn add_variable_write_to_lock_group(&mut self, lock_group: LockGroupId, variable: Uid) {
        self.writes.entry(lock_group).or_default().insert(variable);
    }

    pub fn variable_reads_in_lock_group(&self, lock_group: LockGroupId) -> &BTreeSet<Uid> {
        self.reads.get(&lock_group).unwrap_or(&NO_VARIABLES)
    }

    pub fn variable_writes_in_lock_group(&self, lock_group: LockGroupId) -> &BTreeSet<Uid> {
        self.writes.get(&lock_group).unwrap_or(&NO_VARIABLES)
    }

    /// `1 + highest assigned group`, or 0 when no label needs a lock.
    pub fn number_of_lock_groups(&self) -> usize {
        self.label_groups
            .values()
            .map(|lock_group| lock_group.index() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn protected_global_variables(&self) -> BTreeSet<Uid> {
        self.reads
            .values()
            .chain(self.writes.values())
            .flatten()
            .copied()
            .collect()
    }
}
