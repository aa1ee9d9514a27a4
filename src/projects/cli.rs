//! Command-line entrypoints for pgo.
//!
//! This module parses CLI commands and dispatches them into the build and check workflows.

use crate::build_system::build::{self, BuildOverrides};
use crate::compiler_frontend::Flag;
use crate::compiler_frontend::analysis::atomicity::AtomicityReport;
use crate::compiler_frontend::compiler_errors::CompilerMessages;
use crate::compiler_frontend::display_messages::print_compiler_messages;
use saying::say;
use std::env;
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    // Compiles an algorithm and writes the Go file
    Build {
        path: String,
        overrides: BuildOverrides,
    },

    // Runs the pipeline without writing anything and prints the inferred lock groups
    Check {
        path: String,
        json: bool,
    },

    Help,
}

pub fn start_cli() {
    let compiler_args: Vec<String> = env::args().collect();

    if compiler_args.len() < 2 {
        print_help(false);
        return;
    }

    let command = match get_command(&compiler_args[1..]) {
        Ok(command) => command,
        Err(e) => {
            say!(Red e);
            print_help(true);
            return;
        }
    };

    let flags = get_flags(&compiler_args);

    match command {
        Command::Help => {
            print_help(false);
        }

        Command::Build { path, overrides } => {
            let messages = build::build_project(&path, &overrides, &flags);
            print_compiler_messages(messages);
        }

        Command::Check { path, json } => {
            let config = match build::config_from_entry_path(&path) {
                Ok(config) => config,
                Err(e) => {
                    print_compiler_messages(CompilerMessages::from_error(e));
                    return;
                }
            };

            match build::compile_algorithm(&config, &flags) {
                Ok(compiled) => {
                    if json {
                        match serde_json::to_string_pretty(&compiled.report) {
                            Ok(report) => say!(report),
                            Err(e) => say!(Red "Could not serialize the report: ", e),
                        }
                    } else {
                        print_report(&compiled.report);
                    }

                    print_compiler_messages(CompilerMessages {
                        errors: Vec::new(),
                        warnings: compiled.warnings,
                    });
                }
                Err(messages) => print_compiler_messages(messages),
            }
        }
    }
}

fn get_command(args: &[String]) -> Result<Command, String> {
    let command = args.first().map(String::as_str);

    match command {
        Some("help") | Some("--help") => Ok(Command::Help),

        Some("build") => parse_build_command(args),

        Some("check") => {
            let mut path = String::new();
            let mut json = false;

            for arg in &args[1..] {
                match arg.as_str() {
                    "--json" => json = true,
                    "--hide-warnings" | "--hide-timers" => {}
                    _ if arg.starts_with("--") => {
                        return Err(format!(
                            "Unknown check flag: '{arg}'. The only check flag is --json."
                        ));
                    }
                    _ if path.is_empty() => path = arg.to_owned(),
                    _ => {
                        return Err(String::from(
                            "Check command accepts at most one path argument.",
                        ));
                    }
                }
            }

            Ok(Command::Check { path, json })
        }

        Some(other) => Err(format!("Invalid command: '{other}'")),
        None => Err(String::from("No command given")),
    }
}

fn parse_build_command(args: &[String]) -> Result<Command, String> {
    let mut path = String::new();
    let mut overrides = BuildOverrides::default();
    let mut index = 1usize;

    while let Some(arg) = args.get(index) {
        match arg.as_str() {
            "--coordinated" => {
                overrides.coordinated = true;
                index += 1;
            }
            "--out" => {
                let Some(output) = args.get(index + 1) else {
                    return Err(String::from("Missing value for --out"));
                };
                if output.starts_with("--") {
                    return Err(String::from("Missing value for --out"));
                }
                overrides.output = Some(PathBuf::from(output));
                index += 2;
            }
            "--hide-warnings" | "--hide-timers" => {
                index += 1;
            }
            _ if arg.starts_with("--") => {
                return Err(format!(
                    "Unknown build flag: '{arg}'. Supported build flags are --coordinated, --out."
                ));
            }
            _ => {
                if path.is_empty() {
                    path = arg.to_owned();
                    index += 1;
                } else {
                    return Err(String::from(
                        "Build command accepts at most one path argument.",
                    ));
                }
            }
        }
    }

    Ok(Command::Build { path, overrides })
}

fn get_flags(args: &[String]) -> Vec<Flag> {
    let mut flags = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--hide-warnings" => flags.push(Flag::DisableWarnings),
            "--hide-timers" => flags.push(Flag::DisableTimers),
            _ => {}
        }
    }

    flags
}

fn print_report(report: &AtomicityReport) {
    say!(Green Bold "\nAtomicity for ", Blue report.algorithm.to_owned());

    if report.lock_groups.is_empty() {
        say!(Dark "  No label touches a global variable, no locks needed");
    }

    for group in &report.lock_groups {
        say!(Bold "\n  Lock group ", Blue group.id);
        say!("    labels: ", group.labels.join(", "));
        say!("    reads:  ", group.reads.join(", "));
        say!("    writes: ", group.writes.join(", "));
    }

    if !report.unprotected_labels.is_empty() {
        say!(Dark "\n  Unlocked labels: ", report.unprotected_labels.join(", "));
    }
}

fn print_help(commands_only: bool) {
    if !commands_only {
        say!(Bright Black "------------------------------------");
        say!(Green Bold "pgo - compiles PlusCal algorithms to Go");
        say!("Usage: ", Bold "<command> ", Italic "<args>");
    }
    say!(Green Bold "\nCommands:");
    say!("  build <path>      - Compiles a pgo.toml project or a .json algorithm to Go");
    say!("  check <path>      - Infers lock groups and prints them without writing Go");
    say!("  help              - Shows this message");

    say!(Green Bold "\nFlags:");
    say!("  --hide-warnings");
    say!("  --hide-timers");
    say!("\nBuild command options:");
    say!("  --coordinated     (lock through the distributed state service)");
    say!("  --out <path>      (overrides the output file from pgo.toml)");
    say!("\nCheck command options:");
    say!("  --json            (prints the lock groups as JSON)");
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
