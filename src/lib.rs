pub mod backends;
pub mod build_system {
    pub mod build;
}
pub mod compiler_frontend;
pub mod projects;

pub use projects::cli::start_cli;
