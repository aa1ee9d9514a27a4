//! # The pgo command line and the project configuration it reads

// The basic compiler CLI
pub(crate) mod cli;
pub mod settings;
