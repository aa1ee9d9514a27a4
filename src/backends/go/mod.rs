//! ============================================================
//!                     Go Backend
//! ============================================================
//! Turns a resolved, lock-annotated algorithm into one Go source file.
//!
//! Layout of the generated file:
//!  - package clause and imports (only the ones the body actually uses)
//!  - constants and global variables
//!  - the lock prelude for the chosen strategy
//!  - one function per procedure and per process
//!  - main, which starts every process instance as a goroutine and waits for them

pub mod critical_section;
pub mod critical_section_tracker;
pub mod go_block;
pub mod go_expr;
pub mod go_statement;

use crate::backends::go::critical_section::{GLOBAL_STATE, LOCAL_LOCKS, LockingStrategy};
use crate::backends::go::critical_section_tracker::CriticalSectionTracker;
use crate::backends::go::go_expr::{go_type, lower_expression};
use crate::backends::go::go_statement::BodyLowering;
use crate::codegen_log;
use crate::compiler_frontend::analysis::atomicity::lock_groups::LockGroupRegistry;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::definitions::DefinitionRegistry;
use crate::compiler_frontend::pcal::pcal_nodes::{
    Algorithm, Procedure, Process, ProcessSelf, Statement, VariableDecl,
};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoLoweringConfig {
    pub package: String,
    pub locking: LockingStrategy,

    // Only used by the coordinated strategy
    pub endpoints: Vec<String>,
    pub timeout: u64,
}

impl Default for GoLoweringConfig {
    fn default() -> Self {
        Self {
            package: String::from("main"),
            locking: LockingStrategy::Local,
            endpoints: vec![String::from("127.0.0.1:2379")],
            timeout: 3,
        }
    }
}

/// Imports that depend on what the lowered bodies use.
#[derive(Debug, Default)]
pub struct GoImports {
    pub fmt: bool,
    pub rand: bool,
}

pub fn lower_algorithm_to_go(
    algorithm: &Algorithm,
    definitions: &DefinitionRegistry,
    lock_groups: &LockGroupRegistry,
    config: &GoLoweringConfig,
) -> Result<String, CompilerError> {
    let strategy = config.locking.to_critical_section(lock_groups, definitions)?;
    let mut imports = GoImports::default();
    let mut functions = String::new();

    // Coordinated globals live in the state service, every function works on its own copy
    let global_copies: Vec<&VariableDecl> = match config.locking {
        LockingStrategy::Local => Vec::new(),
        LockingStrategy::Coordinated => algorithm.variables.iter().collect(),
    };

    for procedure in &algorithm.procedures {
        codegen_log!("Lowering procedure ", procedure.name);
        let tracker = CriticalSectionTracker::new(lock_groups, strategy.as_ref(), procedure.uid);
        let body = FunctionBody {
            global_copies: &global_copies,
            variables: &procedure.variables,
            statements: &procedure.body,
        };
        write_procedure(&mut functions, procedure, body, definitions, &mut imports, tracker)?;
    }

    for process in &algorithm.processes {
        codegen_log!("Lowering process ", process.name);
        let tracker = CriticalSectionTracker::new(lock_groups, strategy.as_ref(), process.uid);
        let body = FunctionBody {
            global_copies: &global_copies,
            variables: &process.variables,
            statements: &process.body,
        };
        write_process(&mut functions, process, body, definitions, &mut imports, tracker)?;
    }

    let mut out = String::new();
    write_header(&mut out, algorithm, config, &imports);
    write_globals(&mut out, algorithm, definitions, config)?;
    write_lock_prelude(&mut out, lock_groups, config);
    out.push_str(&functions);
    write_main(&mut out, algorithm, definitions, config)?;

    Ok(out)
}

fn write_header(
    out: &mut String,
    algorithm: &Algorithm,
    config: &GoLoweringConfig,
    imports: &GoImports,
) {
    let _ = writeln!(
        out,
        "// Code generated by pgo from algorithm {}. DO NOT EDIT.",
        algorithm.name
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "package {}", config.package);
    let _ = writeln!(out);

    let mut packages = Vec::new();
    if imports.fmt {
        packages.push("fmt");
    }
    if imports.rand {
        packages.push("math/rand");
    }
    packages.push("sync");
    if config.locking == LockingStrategy::Coordinated {
        packages.push("pgonet");
    }

    let _ = writeln!(out, "import (");
    for package in packages {
        let _ = writeln!(out, "\t\"{package}\"");
    }
    let _ = writeln!(out, ")");
    let _ = writeln!(out);
}

fn write_globals(
    out: &mut String,
    algorithm: &Algorithm,
    definitions: &DefinitionRegistry,
    config: &GoLoweringConfig,
) -> Result<(), CompilerError> {
    let package_variables: &[VariableDecl] = match config.locking {
        LockingStrategy::Local => algorithm.variables.as_slice(),
        LockingStrategy::Coordinated => &[],
    };

    for constant in &algorithm.constants {
        match &constant.value {
            Some(value) => {
                let _ = writeln!(
                    out,
                    "var {} = {}",
                    constant.name,
                    lower_expression(value, definitions)?
                );
            }
            None => {
                let _ = writeln!(out, "var {} int // must be set before main runs", constant.name);
            }
        }
    }

    for variable in package_variables {
        let _ = writeln!(out, "{}", variable_declaration(variable, definitions)?);
    }

    if !algorithm.constants.is_empty() || !package_variables.is_empty() {
        let _ = writeln!(out);
    }

    Ok(())
}

fn write_lock_prelude(out: &mut String, lock_groups: &LockGroupRegistry, config: &GoLoweringConfig) {
    match config.locking {
        LockingStrategy::Local => {
            let number_of_lock_groups = lock_groups.number_of_lock_groups();
            if number_of_lock_groups > 0 {
                let _ = writeln!(out, "var {LOCAL_LOCKS} [{number_of_lock_groups}]sync.Mutex");
                let _ = writeln!(out);
            }
        }
        LockingStrategy::Coordinated => {
            let _ = writeln!(out, "var {GLOBAL_STATE} *pgonet.GlobalState");
            let _ = writeln!(out);
        }
    }
}

fn variable_declaration(
    variable: &VariableDecl,
    definitions: &DefinitionRegistry,
) -> Result<String, CompilerError> {
    Ok(match &variable.value {
        Some(value) => format!(
            "var {} = {}",
            variable.name,
            lower_expression(value, definitions)?
        ),
        None => format!("var {} {}", variable.name, go_type(variable.resource)),
    })
}

/// What a process or procedure function is built from.
struct FunctionBody<'a> {
    global_copies: &'a [&'a VariableDecl],
    variables: &'a [VariableDecl],
    statements: &'a [Statement],
}

// Go rejects unused locals, so every local is also assigned to the blank identifier
fn declare_locals(
    lowering: &mut BodyLowering,
    body: &FunctionBody,
    definitions: &DefinitionRegistry,
) -> Result<(), CompilerError> {
    // Copies start at zero and are only filled in by opening a section
    for global in body.global_copies {
        lowering
            .builder()
            .add_line(format!("var {} {}", global.name, go_type(global.resource)));
        lowering.builder().add_line(format!("_ = {}", global.name));
    }

    for variable in body.variables {
        let declaration = variable_declaration(variable, definitions)?;
        lowering.builder().add_line(declaration);
        lowering.builder().add_line(format!("_ = {}", variable.name));
    }
    Ok(())
}

fn lower_body(
    body: FunctionBody,
    definitions: &DefinitionRegistry,
    imports: &mut GoImports,
    mut tracker: CriticalSectionTracker,
) -> Result<String, CompilerError> {
    let mut lowering = BodyLowering::new(definitions, imports);
    declare_locals(&mut lowering, &body, definitions)?;
    lowering.lower_function_body(body.statements, &mut tracker)?;

    // Falling off the end of a body finishes the step it was in
    tracker.end(lowering.builder());

    Ok(lowering.finish()?.render(1))
}

fn write_procedure(
    out: &mut String,
    procedure: &Procedure,
    body: FunctionBody,
    definitions: &DefinitionRegistry,
    imports: &mut GoImports,
    tracker: CriticalSectionTracker,
) -> Result<(), CompilerError> {
    let mut params = vec![String::from("self int")];
    for param in &procedure.params {
        params.push(format!("{} {}", param.name, go_type(param.resource)));
    }

    let body = lower_body(body, definitions, imports, tracker)?;

    let _ = writeln!(out, "func {}({}) {{", procedure.name, params.join(", "));
    out.push_str(&body);
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    Ok(())
}

fn write_process(
    out: &mut String,
    process: &Process,
    body: FunctionBody,
    definitions: &DefinitionRegistry,
    imports: &mut GoImports,
    tracker: CriticalSectionTracker,
) -> Result<(), CompilerError> {
    let body = lower_body(body, definitions, imports, tracker)?;

    let _ = writeln!(out, "func {}(self int) {{", process.name);
    out.push_str(&body);
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    Ok(())
}

fn write_main(
    out: &mut String,
    algorithm: &Algorithm,
    definitions: &DefinitionRegistry,
    config: &GoLoweringConfig,
) -> Result<(), CompilerError> {
    let _ = writeln!(out, "func main() {{");

    if config.locking == LockingStrategy::Coordinated {
        let endpoints = config
            .endpoints
            .iter()
            .map(|endpoint| format!("{endpoint:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(out, "\tcfg := &pgonet.GlobalsConfig{{");
        let _ = writeln!(out, "\t\tEndpoints: []string{{{endpoints}}},");
        let _ = writeln!(out, "\t\tTimeout:   {},", config.timeout);
        let _ = writeln!(out, "\t}}");
        let _ = writeln!(out, "\tvar err error");
        let _ = writeln!(out, "\t{GLOBAL_STATE}, err = pgonet.InitGlobals(cfg)");
        let _ = writeln!(out, "\tif err != nil {{");
        let _ = writeln!(out, "\t\tpanic(err)");
        let _ = writeln!(out, "\t}}");

        for variable in &algorithm.variables {
            let value = match &variable.value {
                Some(value) => lower_expression(value, definitions)?,
                None => String::from("0"),
            };
            let _ = writeln!(
                out,
                "\tif err := {GLOBAL_STATE}.Set({:?}, {value}); err != nil {{",
                variable.name
            );
            let _ = writeln!(out, "\t\tpanic(err)");
            let _ = writeln!(out, "\t}}");
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "\tvar wg sync.WaitGroup");

    for process in &algorithm.processes {
        match &process.self_value {
            ProcessSelf::Single(value) => {
                let value = lower_expression(value, definitions)?;
                let _ = writeln!(out, "\twg.Add(1)");
                let _ = writeln!(out, "\tgo func() {{");
                let _ = writeln!(out, "\t\tdefer wg.Done()");
                let _ = writeln!(out, "\t\t{}({value})", process.name);
                let _ = writeln!(out, "\t}}()");
            }
            ProcessSelf::Range { low, high } => {
                let low = lower_expression(low, definitions)?;
                let high = lower_expression(high, definitions)?;
                let _ = writeln!(out, "\tfor i := {low}; i <= {high}; i++ {{");
                let _ = writeln!(out, "\t\twg.Add(1)");
                let _ = writeln!(out, "\t\tgo func(self int) {{");
                let _ = writeln!(out, "\t\t\tdefer wg.Done()");
                let _ = writeln!(out, "\t\t\t{}(self)", process.name);
                let _ = writeln!(out, "\t\t}}(i)");
                let _ = writeln!(out, "\t}}");
            }
        }
    }

    let _ = writeln!(out, "\twg.Wait()");
    let _ = writeln!(out, "}}");
    Ok(())
}

#[cfg(test)]
mod tests;
