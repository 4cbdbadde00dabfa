//! Crash recovery log for the work queue.
//!
//! The whole queue is rewritten after every mutation so that a restarted
//! process sees exactly the pending state that existed before the crash.

pub mod codec;


use crate::sandbox::{SandboxError, WorkQueue};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the log file inside the shadow root
pub const LOG_FILE_NAME: &str = "workqueue.data";

/// On-disk home of a persisted work queue
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    temp_path: PathBuf,
    sync: bool,
}

impl Journal {
    /// Journal stored in the given shadow root
    pub fn new(shadow_dir: &Path) -> Self {
        Self {
            path: shadow_dir.join(LOG_FILE_NAME),
            temp_path: shadow_dir.join(format!("{}.tmp", LOG_FILE_NAME)),
            sync: false,
        }
    }

    /// Flush the log to stable storage before it replaces the old one
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the persisted queue. A missing log is an empty queue.
    pub fn load(&self) -> Result<WorkQueue, SandboxError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WorkQueue::new()),
            Err(e) => return Err(e.into()),
        };
        codec::decode(&bytes)
    }

    /// Replace the persisted queue. An empty queue removes the log.
    pub fn save(&self, queue: &WorkQueue) -> Result<(), SandboxError> {
        if queue.is_empty() {
            return self.clear();
        }
        let bytes = codec::encode(queue)?;
        self.atomic_write(&bytes)?;
        Ok(())
    }

    /// Delete the log and any half-written replacement
    pub fn clear(&self) -> Result<(), SandboxError> {
        for path in [&self.path, &self.temp_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write to a temp file, then rename over the log
    fn atomic_write(&self, content: &[u8]) -> io::Result<()> {
        let mut file = File::create(&self.temp_path)?;
        file.write_all(content)?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&self.temp_path, &self.path)
    }
}
