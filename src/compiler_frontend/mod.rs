pub mod compiler_messages {
    pub mod compiler_dev_logging;
    pub mod compiler_errors;
    pub mod compiler_warnings;
    pub mod display_messages;
}
pub use compiler_messages::compiler_errors;
pub use compiler_messages::compiler_warnings;
pub use compiler_messages::display_messages;

pub mod analysis;
pub mod definitions;
pub mod pcal;
pub mod resolution;

#[cfg(test)]
pub(crate) mod test_support;

use crate::backends::go::{GoLoweringConfig, lower_algorithm_to_go};
use crate::compiler_frontend::analysis::atomicity::lock_groups::LockGroupRegistry;
use crate::compiler_frontend::analysis::atomicity::{AtomicityAnalysis, infer_atomicity};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{Algorithm, CharPosition, TextLocation};
use crate::compiler_frontend::resolution::resolve_algorithm;
use crate::projects::settings::Config;
use crate::return_syntax_error;
use std::path::Path;

/// Flags change the behavior of the core pipeline.
/// For the built-in CLI these are added as cli flags.
#[derive(PartialEq, Debug, Clone)]
pub enum Flag {
    DisableWarnings,
    DisableTimers,
}

pub struct CompilerFrontend<'a> {
    pub(crate) project_config: &'a Config,
}

impl<'a> CompilerFrontend<'a> {
    pub fn new(project_config: &'a Config) -> Self {
        Self { project_config }
    }

    /// -----------------------------
    /// LOADING
    /// -----------------------------
    /// The parser and macro expansion run upstream and hand over the algorithm as JSON.
    pub fn load_algorithm(
        &self,
        source_code: &str,
        source_path: &Path,
    ) -> Result<Algorithm, CompilerError> {
        match parse_algorithm_json(source_code) {
            Ok(algorithm) => Ok(algorithm),
            Err(e) => Err(e.with_file_path(source_path.to_path_buf())),
        }
    }

    /// -----------------------------
    /// NAME RESOLUTION
    /// -----------------------------
    /// Registers every declaration and links each identifier to it.
    /// Also checks labels and goto targets.
    pub fn resolve(&self, algorithm: &Algorithm) -> Result<DefinitionRegistry, CompilerError> {
        resolve_algorithm(algorithm)
    }

    /// ------------------------------
    ///  ATOMICITY INFERENCE
    /// ------------------------------
    /// Partitions labels into lock groups so that racing steps share a lock.
    pub fn infer_atomicity(
        &self,
        algorithm: &Algorithm,
        definitions: &DefinitionRegistry,
    ) -> Result<AtomicityAnalysis, CompilerError> {
        infer_atomicity(algorithm, definitions)
    }

    /// ------------------------------
    ///  GO CODE GENERATION
    /// ------------------------------
    pub fn generate_go(
        &self,
        algorithm: &Algorithm,
        definitions: &DefinitionRegistry,
        lock_groups: &LockGroupRegistry,
    ) -> Result<String, CompilerError> {
        let go_config = GoLoweringConfig {
            package: self.project_config.package.to_owned(),
            locking: self.project_config.locking.strategy,
            endpoints: self.project_config.locking.endpoints.to_owned(),
            timeout: self.project_config.locking.timeout,
        };

        lower_algorithm_to_go(algorithm, definitions, lock_groups, &go_config)
    }
}

fn parse_algorithm_json(source_code: &str) -> Result<Algorithm, CompilerError> {
    match serde_json::from_str::<Algorithm>(source_code) {
        Ok(algorithm) => Ok(algorithm),
        Err(e) => {
            let position = CharPosition {
                line_number: e.line().saturating_sub(1) as i32,
                char_column: e.column() as i32,
            };

            return_syntax_error!(
                format!("Malformed algorithm: {e}"),
                TextLocation {
                    start_pos: position,
                    end_pos: position,
                },
                {
                    CompilationStage => "Loading",
                }
            );
        }
    }
}
