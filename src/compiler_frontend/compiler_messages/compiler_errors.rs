use crate::compiler_frontend::compiler_warnings::CompilerWarning;
use crate::compiler_frontend::pcal::pcal_nodes::TextLocation;
use std::collections::HashMap;
use std::path::PathBuf;

// The final set of errors and warnings emitted from the compiler
#[derive(Debug, Default)]
pub struct CompilerMessages {
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
}

impl CompilerMessages {
    pub fn new() -> Self {
        CompilerMessages {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn from_error(error: CompilerError) -> Self {
        CompilerMessages {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Eq, Hash, PartialEq)]
pub enum ErrorMetaDataKey {
    CompilationStage,

    // Optional suggestions
    PrimarySuggestion,     // One-line fix or top-level idea
    AlternativeSuggestion, // Secondary alternative
}

#[derive(Debug)]
pub struct CompilerError {
    pub msg: String,

    // Position inside the source algorithm, when the failing node carried one.
    pub location: TextLocation,

    // The file the algorithm was loaded from. Empty until the CLI attaches it.
    pub file_path: PathBuf,
    pub error_type: ErrorType,

    // Structured detail so tools can tell exactly which label/variable was involved
    pub metadata: HashMap<ErrorMetaDataKey, &'static str>,
}

impl CompilerError {
    pub fn new(
        msg: impl Into<String>,
        location: TextLocation,
        error_type: ErrorType,
    ) -> CompilerError {
        CompilerError {
            msg: msg.into(),
            location,
            file_path: PathBuf::new(),
            error_type,
            metadata: HashMap::new(),
        }
    }

    pub fn with_file_path(mut self, file_path: PathBuf) -> Self {
        self.file_path = file_path;
        self
    }

    /// Create a compiler error (internal bug, not the user's fault)
    pub fn compiler_error(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, TextLocation::default(), ErrorType::Compiler)
    }

    /// Create a file system error for a path that could not be read or written
    pub fn file_error(path: &std::path::Path, msg: impl Into<String>) -> Self {
        CompilerError::new(msg, TextLocation::default(), ErrorType::File)
            .with_file_path(path.to_path_buf())
    }

    /// Create a config error without a source position
    pub fn config_error(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, TextLocation::default(), ErrorType::Config)
    }

    pub fn is_internal(&self) -> bool {
        self.error_type == ErrorType::Compiler
    }
}

// Adds more information to the CompilerError
// So it knows which stage produced it and how it should be displayed
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ErrorType {
    Syntax,
    Rule,
    File,
    Config,
    Compiler,
}

/// Returns a new CompilerError for malformed algorithm input.
///
/// Usage:
/// `return_syntax_error!("message", location, {
///     CompilationStage => "Loading",
/// })`;
#[macro_export]
macro_rules! return_syntax_error {
    ($msg:expr, $loc:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $loc,
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Syntax,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $(
                    map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value);
                )*
                map
            },
        })
    };
    ($msg:expr, $loc:expr) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $loc,
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Syntax,
            metadata: std::collections::HashMap::new(),
        })
    };
}

/// Returns a new CompilerError for semantic rule violations.
///
/// Rule errors are reserved for the passes that run before atomicity inference:
/// unresolved identifiers, goto targets that don't exist, duplicate labels.
///
/// Usage: `return_rule_error!("Undefined variable", location, { PrimarySuggestion => "..." })`;
#[macro_export]
macro_rules! return_rule_error {
    ($msg:expr, $location:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Rule,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value); )*
                map
            },
        })
    };
    ($msg:expr, $location:expr) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Rule,
            metadata: std::collections::HashMap::new(),
        })
    };
}

/// Returns a new CompilerError
///
/// Usage: `return_file_error!(path, "message")`;
#[macro_export]
macro_rules! return_file_error {
    ($path:expr, $msg:expr) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::file_error(
            $path, $msg,
        ));
    }};
}

/// Returns a new CompilerError for a malformed pgo.toml
///
/// Usage: `return_config_error!("message")`;
#[macro_export]
macro_rules! return_config_error {
    ($fmt:expr, $($arg:expr),+ $(,)?) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::config_error(
            format!($fmt, $($arg),+),
        ));
    }};
    ($msg:expr) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::config_error(
            $msg,
        ));
    }};
}

/// Returns a new CompilerError for internal compiler bugs.
///
/// Compiler errors mean an earlier pass handed over an inconsistent program.
/// They are never the user's fault and are always reported as a bug.
#[macro_export]
macro_rules! return_compiler_error {
    // Variant with format string, arguments, and metadata (with semicolon separator)
    ($fmt:expr, $($arg:expr),+ ; { $( $key:ident => $value:expr ),* $(,)? }) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: format!($fmt, $($arg),+),
            location: $crate::compiler_frontend::pcal::pcal_nodes::TextLocation::default(),
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value); )*
                map
            },
        });
    }};
    // Variant with format string and arguments (no metadata)
    ($fmt:expr, $($arg:expr),+ $(,)?) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: format!($fmt, $($arg),+),
            location: $crate::compiler_frontend::pcal::pcal_nodes::TextLocation::default(),
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: std::collections::HashMap::new(),
        });
    }};
    // Variant with message and metadata (with semicolon separator)
    ($msg:expr ; { $( $key:ident => $value:expr ),* $(,)? }) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $crate::compiler_frontend::pcal::pcal_nodes::TextLocation::default(),
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key, $value); )*
                map
            },
        });
    }};
    // Simple variant with just message (no metadata)
    ($msg:expr) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $crate::compiler_frontend::pcal::pcal_nodes::TextLocation::default(),
            file_path: std::path::PathBuf::new(),
            error_type: $crate::compiler_frontend::compiler_errors::ErrorType::Compiler,
            metadata: std::collections::HashMap::new(),
        });
    }};
}

/// Pushes an error onto a `CompilerMessages` and returns the messages.
#[macro_export]
macro_rules! return_messages_with_err {
    ($messages:expr, $error:expr) => {{
        $messages.errors.push($error);
        return $messages;
    }};
}
