use crate::compiler_frontend::pcal::pcal_nodes::TextLocation;
use saying::say;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct CompilerWarning {
    pub msg: String,
    pub location: TextLocation,
    pub warning_kind: WarningKind,
    pub file_path: PathBuf,
}

impl CompilerWarning {
    pub fn new(msg: &str, location: TextLocation, warning_kind: WarningKind) -> CompilerWarning {
        CompilerWarning {
            msg: msg.to_owned(),
            location,
            warning_kind,
            file_path: PathBuf::new(),
        }
    }

    pub fn with_file_path(mut self, file_path: PathBuf) -> Self {
        self.file_path = file_path;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarningKind {
    UnusedGlobalVariable,
}

pub fn print_formatted_warning(w: CompilerWarning) {
    say!(Yellow "WARNING: ");
    let message = w.msg;
    match w.warning_kind {
        WarningKind::UnusedGlobalVariable => {
            say!("Global variable '", message, "' is never accessed by any label");
        }
    }
}
