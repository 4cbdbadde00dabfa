use crate::security::SandboxPath;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Not a sandboxed path: {}", .0.display())]
    NotASandboxedDirectory(PathBuf),

    #[error("Absolute path required for external file: {}", .0.display())]
    AbsolutePathRequired(PathBuf),

    #[error("File does not exist: {0}")]
    NotFound(SandboxPath),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(SandboxPath),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Corrupt work queue log: {0}")]
    CorruptLog(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
