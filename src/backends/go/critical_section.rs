//! How a lock group is acquired and released in the generated program.
//!
//! Strategies only emit code. Whether a section is currently open is tracked by
//! `CriticalSectionTracker`, never here.

use crate::backends::go::go_block::{GoBlockBuilder, GoLabelName, GoStatement};
use crate::compiler_frontend::analysis::atomicity::lock_groups::{LockGroupId, LockGroupRegistry};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{ResourceKind, Uid};
use crate::return_rule_error;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Go identifier of the in-process mutex array.
pub const LOCAL_LOCKS: &str = "pgoLocks";

/// Go identifier of the `pgonet` client shared by every goroutine.
/// `Lock` and `Unlock` come from `runtime/pgonet/locks.go`.
pub const GLOBAL_STATE: &str = "pgoGlobalState";

pub trait CriticalSection {
    fn start_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        process: Uid,
        lock_group: LockGroupId,
        label: Uid,
        label_name: &GoLabelName,
    );

    fn end_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        process: Uid,
        lock_group: LockGroupId,
        label: Uid,
        label_name: &GoLabelName,
    );

    /// Gives the lock back without committing. The tracker emits the jump back to the label.
    fn abort_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        process: Uid,
        lock_group: LockGroupId,
        label: Uid,
        label_name: &GoLabelName,
    );
}

/// Chosen once per compilation from the project config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingStrategy {
    #[default]
    Local,
    Coordinated,
}

impl LockingStrategy {
    pub fn to_critical_section(
        self,
        lock_groups: &LockGroupRegistry,
        definitions: &DefinitionRegistry,
    ) -> Result<Box<dyn CriticalSection>, CompilerError> {
        Ok(match self {
            LockingStrategy::Local => Box::new(LocalCriticalSection),
            LockingStrategy::Coordinated => {
                Box::new(CoordinatedCriticalSection::new(lock_groups, definitions)?)
            }
        })
    }
}

/// Every goroutine shares a fixed `[N]sync.Mutex` array, one mutex per lock group.
#[derive(Debug, Default)]
pub struct LocalCriticalSection;

impl CriticalSection for LocalCriticalSection {
    fn start_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        _process: Uid,
        lock_group: LockGroupId,
        _label: Uid,
        _label_name: &GoLabelName,
    ) {
        builder.add_line(format!("{LOCAL_LOCKS}[{lock_group}].Lock()"));
    }

    fn end_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        _process: Uid,
        lock_group: LockGroupId,
        _label: Uid,
        _label_name: &GoLabelName,
    ) {
        builder.add_line(format!("{LOCAL_LOCKS}[{lock_group}].Unlock()"));
    }

    // Nothing was written anywhere but local memory, so aborting is just unlocking
    fn abort_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        process: Uid,
        lock_group: LockGroupId,
        label: Uid,
        label_name: &GoLabelName,
    ) {
        self.end_critical_section(builder, process, lock_group, label, label_name);
    }
}

/// Locks and global variables both live in the `pgonet` state service.
///
/// Each function keeps a local copy of every global. Opening a section locks the
/// group and loads the copies of every variable the group touches, closing it
/// stores the written ones back before unlocking. Any call can fail, and a failure
/// stops the generated program.
#[derive(Debug, Default)]
pub struct CoordinatedCriticalSection {
    shared: FxHashMap<LockGroupId, SharedGlobals>,
}

/// Global variable names a lock group moves in and out of the state service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SharedGlobals {
    pub loads: Vec<String>,
    pub stores: Vec<String>,
}

impl CoordinatedCriticalSection {
    /// The state service only stores integers, so slice and map globals are rejected.
    pub fn new(
        lock_groups: &LockGroupRegistry,
        definitions: &DefinitionRegistry,
    ) -> Result<Self, CompilerError> {
        for global in definitions.global_variables() {
            if global.resource_kind() != ResourceKind::Plain {
                return_rule_error!(
                    format!(
                        "Global variable '{}' is a {:?}, but coordinated locking can only share integer globals",
                        global.name,
                        global.resource_kind()
                    ),
                    global.location,
                    {
                        PrimarySuggestion => "Use the local locking strategy for this algorithm",
                    }
                );
            }
        }

        let mut shared = FxHashMap::default();
        for index in 0..lock_groups.number_of_lock_groups() {
            let lock_group = LockGroupId(index as u32);
            let reads = lock_groups.variable_reads_in_lock_group(lock_group);
            let writes = lock_groups.variable_writes_in_lock_group(lock_group);

            let mut loads = Vec::new();
            for variable in reads.union(writes) {
                loads.push(definitions.definition(*variable)?.name.to_owned());
            }
            let mut stores = Vec::new();
            for variable in writes {
                stores.push(definitions.definition(*variable)?.name.to_owned());
            }

            shared.insert(lock_group, SharedGlobals { loads, stores });
        }

        Ok(Self { shared })
    }

    pub fn shared_globals(&self, lock_group: LockGroupId) -> Option<&SharedGlobals> {
        self.shared.get(&lock_group)
    }

    fn emit_checked_call(builder: &mut GoBlockBuilder, call: String) {
        builder.add_statement(GoStatement::If {
            condition: format!("err := {call}; err != nil"),
            yes: vec![GoStatement::Line("panic(err)".to_owned())],
            no: Vec::new(),
        });
    }
}

impl CriticalSection for CoordinatedCriticalSection {
    fn start_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        _process: Uid,
        lock_group: LockGroupId,
        _label: Uid,
        _label_name: &GoLabelName,
    ) {
        Self::emit_checked_call(builder, format!("{GLOBAL_STATE}.Lock(self, {lock_group})"));

        if let Some(shared) = self.shared_globals(lock_group) {
            for name in &shared.loads {
                builder.add_statement(GoStatement::If {
                    condition: format!(
                        "pgoValue, err := {GLOBAL_STATE}.GetInt({name:?}); err != nil"
                    ),
                    yes: vec![GoStatement::Line("panic(err)".to_owned())],
                    no: vec![GoStatement::Line(format!("{name} = pgoValue"))],
                });
            }
        }
    }

    fn end_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        _process: Uid,
        lock_group: LockGroupId,
        _label: Uid,
        _label_name: &GoLabelName,
    ) {
        if let Some(shared) = self.shared_globals(lock_group) {
            for name in &shared.stores {
                Self::emit_checked_call(builder, format!("{GLOBAL_STATE}.Set({name:?}, {name})"));
            }
        }

        Self::emit_checked_call(builder, format!("{GLOBAL_STATE}.Unlock(self, {lock_group})"));
    }

    // Local copies are thrown away and reloaded when the label is retried
    fn abort_critical_section(
        &self,
        builder: &mut GoBlockBuilder,
        _process: Uid,
        lock_group: LockGroupId,
        _label: Uid,
        _label_name: &GoLabelName,
    ) {
        Self::emit_checked_call(builder, format!("{GLOBAL_STATE}.Unlock(self, {lock_group})"));
    }
}

#[cfg(test)]
#[path = "tests/critical_section_tests.rs"]
mod tests;
