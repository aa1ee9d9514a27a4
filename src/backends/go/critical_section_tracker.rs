//! ============================================================
//!                  Critical Section Tracker
//! ============================================================
//! Follows one process (or procedure) body while its Go code is emitted, and
//! decides where lock groups are acquired and released.
//!
//! The tracker is either Idle or Open on one lock group. Entering a label opens that
//! label's group (closing a different one first). Control transfers close it.
//! Await aborts it and jumps back to the label so the step can be retried.
//!
//! Branches are emitted with a clone of the tracker per branch. Once every branch is
//! done the clones must agree, which `check_compatibility` enforces.

use crate::backends::go::critical_section::CriticalSection;
use crate::backends::go::go_block::{GoBlockBuilder, GoLabelName};
use crate::codegen_log;
use crate::compiler_frontend::analysis::atomicity::lock_groups::{LockGroupId, LockGroupRegistry};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::pcal::pcal_nodes::Uid;
use crate::return_compiler_error;
use std::ptr;

#[derive(Clone)]
pub struct CriticalSectionTracker<'a> {
    lock_groups: &'a LockGroupRegistry,
    strategy: &'a dyn CriticalSection,
    process: Uid,

    // Some only while a section is open
    lock_group: Option<LockGroupId>,

    // The label the current step started at. Kept while Idle so that a label with
    // no lock group can still be retried by an await.
    label: Option<(Uid, GoLabelName)>,
}

impl<'a> CriticalSectionTracker<'a> {
    pub fn new(
        lock_groups: &'a LockGroupRegistry,
        strategy: &'a dyn CriticalSection,
        process: Uid,
    ) -> Self {
        Self {
            lock_groups,
            strategy,
            process,
            lock_group: None,
            label: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock_group.is_some()
    }

    pub fn current_lock_group(&self) -> Option<LockGroupId> {
        self.lock_group
    }

    pub fn current_label(&self) -> Option<&GoLabelName> {
        self.label.as_ref().map(|(_, name)| name)
    }

    /// Called when code generation reaches a label.
    pub fn start(
        &mut self,
        builder: &mut GoBlockBuilder,
        label: Uid,
        label_name: &GoLabelName,
    ) -> Result<(), CompilerError> {
        let lock_group = self.lock_groups.lock_group_or_default(label, None);

        if let Some(open_group) = self.lock_group {
            // Still inside the same group, the lock is already held
            if Some(open_group) == lock_group {
                codegen_log!("  ", label_name, " continues lock group ", open_group);
                return Ok(());
            }
            self.end(builder);
        }

        builder.ensure_label_declared(label_name)?;
        self.label = Some((label, label_name.to_owned()));

        if let Some(lock_group) = lock_group {
            codegen_log!("  ", label_name, " opens lock group ", lock_group);
            self.strategy.start_critical_section(
                builder,
                self.process,
                lock_group,
                label,
                label_name,
            );
            self.lock_group = Some(lock_group);
        }

        Ok(())
    }

    /// Closes the open section, if any. The tracker is Idle afterwards.
    pub fn end(&mut self, builder: &mut GoBlockBuilder) {
        if let (Some(lock_group), Some((label, label_name))) = (self.lock_group, &self.label) {
            codegen_log!("  ", label_name, " closes lock group ", lock_group);
            self.strategy
                .end_critical_section(builder, self.process, lock_group, *label, label_name);
        }

        self.lock_group = None;
        self.label = None;
    }

    /// Gives up the current step: release without committing and jump back to its label.
    pub fn abort(&mut self, builder: &mut GoBlockBuilder) -> Result<(), CompilerError> {
        let Some((label, label_name)) = self.label.take() else {
            return_compiler_error!(
                "Tried to abort a critical section outside of any label";
                {
                    CompilationStage => "Go Codegen",
                }
            );
        };

        if let Some(lock_group) = self.lock_group.take() {
            self.strategy
                .abort_critical_section(builder, self.process, lock_group, label, &label_name);
        }

        builder.go_to(&label_name);
        Ok(())
    }

    /// Two trackers for alternative paths of the same code must end up in the same state.
    pub fn check_compatibility(&self, other: &CriticalSectionTracker) -> Result<(), CompilerError> {
        if !ptr::eq(self.lock_groups, other.lock_groups) {
            return_compiler_error!("Critical section trackers use different lock group registries");
        }

        if !ptr::addr_eq(self.strategy, other.strategy) {
            return_compiler_error!("Critical section trackers use different locking strategies");
        }

        if self.process != other.process {
            return_compiler_error!(
                "Critical section trackers belong to different processes ({} and {})",
                self.process,
                other.process
            );
        }

        if self.lock_group != other.lock_group {
            return_compiler_error!(
                "Branches disagree on the open lock group ({:?} and {:?})",
                self.lock_group,
                other.lock_group;
                {
                    CompilationStage => "Go Codegen",
                }
            );
        }

        let self_label = self.label.as_ref().map(|(uid, _)| *uid);
        let other_label = other.label.as_ref().map(|(uid, _)| *uid);
        if self_label != other_label {
            return_compiler_error!(
                "Branches disagree on the current label ({:?} and {:?})",
                self.current_label(),
                other.current_label();
                {
                    CompilationStage => "Go Codegen",
                }
            );
        }

        if self.current_label() != other.current_label() {
            return_compiler_error!(
                "Label {:?} has two different Go names ({:?} and {:?})",
                self_label,
                self.current_label(),
                other.current_label()
            );
        }

        Ok(())
    }

    /// Snapshot taken before a loop body is emitted. Applying it at the end of the body
    /// puts the tracker back in the state the loop condition was checked in.
    ///
    /// With no label held at the loop top, applying it ends whatever section the body
    /// left open instead of doing nothing, so the back edge never re-enters the loop
    /// holding a lock. When the body ends Idle too, nothing is emitted.
    pub fn action_at_loop_end(&self) -> LoopEndAction {
        LoopEndAction {
            label: self.label.to_owned(),
        }
    }
}

pub struct LoopEndAction {
    label: Option<(Uid, GoLabelName)>,
}

impl LoopEndAction {
    pub fn apply(
        self,
        tracker: &mut CriticalSectionTracker,
        builder: &mut GoBlockBuilder,
    ) -> Result<(), CompilerError> {
        match self.label {
            Some((label, label_name)) => tracker.start(builder, label, &label_name),
            None => {
                tracker.end(builder);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/critical_section_tracker_tests.rs"]
mod tests;
