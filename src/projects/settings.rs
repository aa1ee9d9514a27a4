//! Project configuration, read from `pgo.toml`.
//!
//! ```toml
//! [build]
//! input = "algorithm.json"
//! output = "out/main.go"
//! package = "main"
//!
//! [locking]
//! strategy = "local"   # or "coordinated"
//! endpoints = ["127.0.0.1:2379"]
//! timeout = 3
//! ```

use crate::backends::go::critical_section::LockingStrategy;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::{return_config_error, return_file_error};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "pgo.toml";
pub const ALGORITHM_FILE_EXTENSION: &str = "json";
pub const GO_FILE_EXTENSION: &str = "go";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory every relative path in the config is resolved against
    pub entry_dir: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub package: String,
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockingConfig {
    pub strategy: LockingStrategy,
    pub endpoints: Vec<String>,

    /// Seconds, per request to the lock service
    pub timeout: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            strategy: LockingStrategy::Local,
            endpoints: vec![String::from("127.0.0.1:2379")],
            timeout: 3,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    build: BuildSection,
    locking: LockingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BuildSection {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    package: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            package: String::from("main"),
        }
    }
}

impl Config {
    /// Defaults for compiling a single algorithm file with no config.
    pub fn for_algorithm(input: PathBuf) -> Self {
        let entry_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Config {
            output: input.with_extension(GO_FILE_EXTENSION),
            input,
            entry_dir,
            package: String::from("main"),
            locking: LockingConfig::default(),
        }
    }

    pub fn load(config_path: &Path) -> Result<Self, CompilerError> {
        let source = match fs::read_to_string(config_path) {
            Ok(source) => source,
            Err(e) => return_file_error!(config_path, format!("Could not read config: {e}")),
        };

        let entry_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self::from_toml_str(&source, &entry_dir)
            .map_err(|e| e.with_file_path(config_path.to_path_buf()))
    }

    pub fn from_toml_str(source: &str, entry_dir: &Path) -> Result<Self, CompilerError> {
        let file: ConfigFile = match toml::from_str(source) {
            Ok(file) => file,
            Err(e) => return_config_error!("Could not parse {}: {}", CONFIG_FILE_NAME, e),
        };

        let Some(input) = file.build.input else {
            return_config_error!("[build] needs an 'input' algorithm file");
        };
        let input = entry_dir.join(input);

        let output = match file.build.output {
            Some(output) => entry_dir.join(output),
            None => input.with_extension(GO_FILE_EXTENSION),
        };

        if file.build.package.is_empty() {
            return_config_error!("[build] package name can't be empty");
        }

        if file.locking.strategy == LockingStrategy::Coordinated {
            if file.locking.endpoints.is_empty() {
                return_config_error!("The coordinated locking strategy needs at least one endpoint");
            }
            if file.locking.timeout == 0 {
                return_config_error!("[locking] timeout must be at least one second");
            }
        }

        Ok(Config {
            entry_dir: entry_dir.to_path_buf(),
            input,
            output,
            package: file.build.package,
            locking: file.locking,
        })
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
