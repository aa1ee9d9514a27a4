use crate::backends::go::critical_section::LockingStrategy;
use crate::compiler_frontend::analysis::atomicity::AtomicityReport;
use crate::compiler_frontend::compiler_errors::{CompilerError, CompilerMessages};
use crate::compiler_frontend::compiler_warnings::CompilerWarning;
use crate::compiler_frontend::{CompilerFrontend, Flag};
use crate::projects::settings::{ALGORITHM_FILE_EXTENSION, CONFIG_FILE_NAME, Config};
use crate::{return_messages_with_err, timer_log};
use saying::say;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything one compilation produces before anything is written to disk.
pub struct CompiledAlgorithm {
    pub go_source: String,
    pub report: AtomicityReport,
    pub warnings: Vec<CompilerWarning>,
}

/// Settings from the command line that take priority over pgo.toml.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildOverrides {
    pub coordinated: bool,
    pub output: Option<PathBuf>,
}

/// Works out the config for whatever the user pointed the CLI at:
/// a pgo.toml, a directory containing one, or a bare algorithm file.
pub fn config_from_entry_path(entry_path: &str) -> Result<Config, CompilerError> {
    let path = if entry_path.is_empty() {
        PathBuf::from(CONFIG_FILE_NAME)
    } else {
        PathBuf::from(entry_path)
    };

    if path.is_dir() {
        return Config::load(&path.join(CONFIG_FILE_NAME));
    }

    if !path.exists() {
        return Err(CompilerError::file_error(&path, "No such file or directory"));
    }

    match path.extension().and_then(|extension| extension.to_str()) {
        Some("toml") => Config::load(&path),
        Some(ALGORITHM_FILE_EXTENSION) => Ok(Config::for_algorithm(path)),
        _ => Err(CompilerError::file_error(
            &path,
            format!("Expected a {CONFIG_FILE_NAME} or a .{ALGORITHM_FILE_EXTENSION} algorithm file"),
        )),
    }
}

/// Runs the whole pipeline on the configured input: load, resolve, infer atomicity, lower to Go.
pub fn compile_algorithm(
    config: &Config,
    flags: &[Flag],
) -> Result<CompiledAlgorithm, CompilerMessages> {
    let frontend = CompilerFrontend::new(config);

    let source_code = match fs::read_to_string(&config.input) {
        Ok(source) => source,
        Err(e) => {
            return Err(CompilerMessages::from_error(CompilerError::file_error(
                &config.input,
                format!("Could not read algorithm: {e}"),
            )));
        }
    };

    let attach_path = |e: CompilerError| {
        CompilerMessages::from_error(e.with_file_path(config.input.to_owned()))
    };

    let _time = Instant::now();
    let algorithm = frontend
        .load_algorithm(&source_code, &config.input)
        .map_err(attach_path)?;
    timer_log!(_time, "Loaded algorithm in: ");

    let _time = Instant::now();
    let definitions = frontend.resolve(&algorithm).map_err(attach_path)?;
    timer_log!(_time, "Resolved names in: ");

    let _time = Instant::now();
    let analysis = frontend
        .infer_atomicity(&algorithm, &definitions)
        .map_err(attach_path)?;
    timer_log!(_time, "Inferred atomicity in: ");

    let _time = Instant::now();
    let go_source = frontend
        .generate_go(&algorithm, &definitions, &analysis.lock_groups)
        .map_err(attach_path)?;
    timer_log!(_time, "Generated Go in: ");

    let warnings = if flags.contains(&Flag::DisableWarnings) {
        Vec::new()
    } else {
        analysis
            .warnings
            .into_iter()
            .map(|warning| warning.with_file_path(config.input.to_owned()))
            .collect()
    };

    Ok(CompiledAlgorithm {
        go_source,
        report: analysis.report,
        warnings,
    })
}

/// Compiles the project and writes the Go file.
pub fn build_project(
    entry_path: &str,
    overrides: &BuildOverrides,
    flags: &[Flag],
) -> CompilerMessages {
    let start = Instant::now();
    let mut messages = CompilerMessages::new();

    let mut config = match config_from_entry_path(entry_path) {
        Ok(config) => config,
        Err(e) => return_messages_with_err!(messages, e),
    };

    if overrides.coordinated {
        config.locking.strategy = LockingStrategy::Coordinated;
    }
    if let Some(output) = &overrides.output {
        config.output = output.to_owned();
    }

    say!("\nCompiling ", Blue config.input.display());

    let compiled = match compile_algorithm(&config, flags) {
        Ok(compiled) => compiled,
        Err(compiler_messages) => return compiler_messages,
    };
    messages.warnings = compiled.warnings;

    if let Err(e) = write_output(&config.output, &compiled.go_source) {
        return_messages_with_err!(messages, e);
    }

    if !flags.contains(&Flag::DisableTimers) {
        let duration = start.elapsed();
        say!(
            "\nBuilt ",
            Blue config.output.display(),
            Reset " with ",
            Blue compiled.report.lock_groups.len(),
            Reset " lock groups in: ",
            Green Bold #duration
        );
    }

    messages
}

fn write_output(output: &Path, go_source: &str) -> Result<(), CompilerError> {
    if output.as_os_str().is_empty() {
        return Err(CompilerError::compiler_error(
            "Output file did not have a name or path set",
        ));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Err(CompilerError::file_error(
                    parent,
                    format!("Could not create output directory: {e}"),
                ));
            }
        }
    }

    match fs::write(output, go_source) {
        Ok(()) => Ok(()),
        Err(e) => Err(CompilerError::file_error(
            output,
            format!("Error writing file: {e}"),
        )),
    }
}

#[cfg(test)]
#[path = "tests/build_tests.rs"]
mod tests;
