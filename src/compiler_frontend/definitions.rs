//! Every declaration in the algorithm, and which declaration each identifier refers to.
//!
//! Filled once by the resolution pass. Everything after resolution only reads it.

use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::pcal::pcal_nodes::{ResourceKind, TextLocation, Uid};
use crate::return_compiler_error;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    GlobalVariable(ResourceKind),

    /// Declared by a process or procedure. Every process instance gets its own copy.
    LocalVariable(ResourceKind),
    Parameter(ResourceKind),

    /// Bound by `with`
    BoundVariable,
    Constant,

    /// The implicit `self` of a process
    ProcessSelf,
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub uid: Uid,
    pub name: String,
    pub kind: DefinitionKind,
    pub location: TextLocation,
}

impl Definition {
    pub fn resource_kind(&self) -> ResourceKind {
        match self.kind {
            DefinitionKind::GlobalVariable(kind)
            | DefinitionKind::LocalVariable(kind)
            | DefinitionKind::Parameter(kind) => kind,
            DefinitionKind::BoundVariable
            | DefinitionKind::Constant
            | DefinitionKind::ProcessSelf => ResourceKind::Plain,
        }
    }
}

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: FxHashMap<Uid, Definition>,

    // Identifier expression Uid -> declaration Uid
    references: FxHashMap<Uid, Uid>,

    // Declaration order, so anything iterating globals stays deterministic
    global_variables: Vec<Uid>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_definition(&mut self, definition: Definition) -> Result<(), CompilerError> {
        if self.definitions.contains_key(&definition.uid) {
            return_compiler_error!(
                "Declaration {} ('{}') was registered twice",
                definition.uid,
                definition.name;
                {
                    CompilationStage => "Resolution",
                }
            );
        }

        if matches!(definition.kind, DefinitionKind::GlobalVariable(_)) {
            self.global_variables.push(definition.uid);
        }

        self.definitions.insert(definition.uid, definition);
        Ok(())
    }

    pub fn add_reference(&mut self, identifier: Uid, declaration: Uid) {
        self.references.insert(identifier, declaration);
    }

    /// The declaration an identifier expression refers to.
    pub fn follow_reference(&self, identifier: Uid) -> Result<Uid, CompilerError> {
        match self.references.get(&identifier) {
            Some(declaration) => Ok(*declaration),
            None => return_compiler_error!(
                "Identifier {} was never resolved to a declaration",
                identifier;
                {
                    CompilationStage => "Resolution",
                }
            ),
        }
    }

    pub fn definition(&self, declaration: Uid) -> Result<&Definition, CompilerError> {
        match self.definitions.get(&declaration) {
            Some(definition) => Ok(definition),
            None => return_compiler_error!("No declaration registered for {}", declaration),
        }
    }

    /// The declaration behind an identifier expression.
    pub fn resolve(&self, identifier: Uid) -> Result<&Definition, CompilerError> {
        self.definition(self.follow_reference(identifier)?)
    }

    pub fn is_global_variable(&self, declaration: Uid) -> bool {
        matches!(
            self.definitions.get(&declaration).map(|d| d.kind),
            Some(DefinitionKind::GlobalVariable(_))
        )
    }

    pub fn global_variables(&self) -> impl Iterator<Item = &Definition> {
        self.global_variables
            .iter()
            .filter_map(|uid| self.definitions.get(uid))
    }
}

#[cfg(test)]
#[path = "tests/definitions_tests.rs"]
mod tests;
