//! CLI error hierarchy.
//!
//! Library crates surface their own structured errors; this type
//! aggregates them for command code, and `miette` renders the result at
//! the binary boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Server error: {0}")]
    Server(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fs(#[from] peaque_fs::FsError),

    #[error(transparent)]
    Router(#[from] peaque_router::RouterError),

    #[error("Transform error: {0}")]
    Transform(#[from] peaque_transform::TransformError),

    #[error("Build error: {0}")]
    Build(#[from] peaque_build::BuildError),

    #[error("Module runtime error: {0}")]
    Runtime(String),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Render a CLI error as a miette diagnostic for the binary boundary.
pub fn into_miette(err: CliError) -> miette::Report {
    miette::Report::msg(err.to_string())
}
