mod commit;
mod error;
mod op;
mod query;
mod write;


pub use commit::{CommitFailure, CommitReport};
pub use error::SandboxError;
pub use op::{FileOp, WorkQueue};
pub use write::DeleteOption;

use crate::journal::Journal;
use crate::security::{PathValidator, SandboxPath};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the shadow file tree inside the shadow root
pub const DATA_DIR_NAME: &str = "data";

/// Transactional staging area over a base directory tree.
///
/// Writes, moves and deletes are recorded in a work queue and backed by
/// files in a shadow tree. Nothing under the base directory changes until
/// [`Sandbox::commit`]. Not synchronized; use from one thread at a time.
pub struct Sandbox {
    validator: PathValidator,
    shadow_dir: PathBuf,
    data_dir: PathBuf,
    queue: WorkQueue,
    journal: Journal,
    persist: bool,
}

/// Configuration for opening a sandbox
pub struct SandboxBuilder {
    base_dir: PathBuf,
    shadow_dir: PathBuf,
    persist: bool,
    sync_log: bool,
    discard_corrupt_log: bool,
}

impl SandboxBuilder {
    /// Create a new builder with default settings
    pub fn new(base_dir: impl Into<PathBuf>, shadow_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            shadow_dir: shadow_dir.into(),
            persist: true,
            sync_log: false,
            discard_corrupt_log: false,
        }
    }

    /// Write the work queue log after every mutation
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// fsync the log before it replaces the previous one
    pub fn sync_log(mut self, sync: bool) -> Self {
        self.sync_log = sync;
        self
    }

    /// Open empty instead of failing when the existing log is unreadable
    pub fn discard_corrupt_log(mut self, discard: bool) -> Self {
        self.discard_corrupt_log = discard;
        self
    }

    /// Open the sandbox, recovering any queue left by a previous session
    pub fn open(self) -> Result<Sandbox, SandboxError> {
        let base_dir = std::path::absolute(&self.base_dir)?;
        let shadow_dir = std::path::absolute(&self.shadow_dir)?;

        if shadow_dir.starts_with(&base_dir) {
            return Err(SandboxError::InvalidPath(format!(
                "Shadow directory {} is inside base directory {}",
                shadow_dir.display(),
                base_dir.display()
            )));
        }

        fs::create_dir_all(&shadow_dir)?;

        let journal = Journal::new(&shadow_dir).sync(self.sync_log);
        let mut sandbox = Sandbox {
            validator: PathValidator::new(base_dir),
            data_dir: shadow_dir.join(DATA_DIR_NAME),
            shadow_dir,
            queue: WorkQueue::new(),
            journal,
            persist: self.persist,
        };

        match sandbox.journal.load() {
            Ok(queue) => {
                if !queue.is_empty() {
                    tracing::info!(
                        entries = queue.len(),
                        log = %sandbox.journal.path().display(),
                        "Recovered pending work queue"
                    );
                }
                sandbox.queue = queue;
            }
            Err(SandboxError::CorruptLog(reason)) if self.discard_corrupt_log => {
                tracing::warn!(%reason, "Discarding staged changes: work queue log is corrupt");
                sandbox.discard()?;
            }
            Err(e) => return Err(e),
        }

        Ok(sandbox)
    }
}

impl Sandbox {
    /// Open with default settings
    pub fn open(
        base_dir: impl Into<PathBuf>,
        shadow_dir: impl Into<PathBuf>,
    ) -> Result<Self, SandboxError> {
        SandboxBuilder::new(base_dir, shadow_dir).open()
    }

    pub fn builder(base_dir: impl Into<PathBuf>, shadow_dir: impl Into<PathBuf>) -> SandboxBuilder {
        SandboxBuilder::new(base_dir, shadow_dir)
    }

    pub fn base_dir(&self) -> &Path {
        self.validator.base_dir()
    }

    pub fn shadow_dir(&self) -> &Path {
        &self.shadow_dir
    }

    /// Root of the shadow file tree
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether a path lies inside the base tree
    pub fn is_sandboxed(&self, path: impl AsRef<Path>) -> bool {
        self.validator.is_sandboxed(path)
    }

    /// Validate a path and convert it to base-relative form
    pub fn ensure_valid_path(&self, path: impl AsRef<Path>) -> Result<SandboxPath, SandboxError> {
        self.validator.validate(path)
    }

    pub fn has_changes(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Copy of the pending operations in replay order
    pub fn work_queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// Files physically present in the shadow store
    pub fn staged_files(&self) -> Result<Vec<SandboxPath>, SandboxError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.data_dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.data_dir)
                .map_err(|_| SandboxError::InvalidPath(entry.path().display().to_string()))?;
            files.push(SandboxPath::parse(relative)?);
        }
        Ok(files)
    }

    /// Drop all staged state: the queue, its log and the shadow store
    pub fn discard(&mut self) -> Result<(), SandboxError> {
        let dropped = self.queue.len();
        self.queue.clear();
        self.journal.clear()?;

        match fs::remove_dir_all(&self.data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(dropped, "Discarded staged changes");
        Ok(())
    }

    fn base_path(&self, path: &SandboxPath) -> PathBuf {
        path.resolve_in(self.validator.base_dir())
    }

    fn shadow_path(&self, path: &SandboxPath) -> PathBuf {
        path.resolve_in(&self.data_dir)
    }

    /// Best-effort write of the queue log
    fn persist(&self) {
        if !self.persist {
            return;
        }
        if let Err(e) = self.journal.save(&self.queue) {
            tracing::warn!(
                error = %e,
                log = %self.journal.path().display(),
                "Failed to persist work queue"
            );
        }
    }
}
