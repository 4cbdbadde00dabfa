// Public API exports
pub mod journal;
pub mod sandbox;
pub mod security;

// Re-export main types for convenience
pub use sandbox::{
    CommitFailure, CommitReport, DeleteOption, FileOp, Sandbox, SandboxBuilder, SandboxError,
    WorkQueue,
};
pub use security::{PathValidator, SandboxPath};

pub use journal::{Journal, LOG_FILE_NAME};
pub use sandbox::DATA_DIR_NAME;
