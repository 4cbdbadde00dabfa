use super::{FileOp, Sandbox, SandboxError};
use crate::security::SandboxPath;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

impl Sandbox {
    /// Whether the path exists in the logical (staged) view.
    ///
    /// A shadow file wins, then a pending move or mkdir, then a pending
    /// removal, then whatever is in the base tree.
    pub fn exists(&self, path: impl AsRef<Path>) -> Result<bool, SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        Ok(self.exists_rel(&rel))
    }

    /// Whether the path is a directory in the logical view
    pub fn is_directory(&self, path: impl AsRef<Path>) -> Result<bool, SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        Ok(self.is_directory_rel(&rel))
    }

    /// The physical file holding the logical content of `path`.
    ///
    /// Fails with [`SandboxError::NotFound`] when the path is pending removal.
    /// The returned file may not exist if neither shadow nor base has it.
    pub fn input_file(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        self.input_file_rel(&rel)
    }

    /// Open the logical content of `path` for reading.
    ///
    /// A pending removal yields [`SandboxError::NotFound`]; a path missing
    /// from the base tree yields an `Io` error of kind `NotFound`.
    pub fn file_input_stream(&self, path: impl AsRef<Path>) -> Result<File, SandboxError> {
        let file = self.input_file(path)?;
        Ok(File::open(file)?)
    }

    /// Read the whole logical content of `path`
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, SandboxError> {
        let file = self.input_file(path)?;
        Ok(fs::read(file)?)
    }

    /// Logical children of a directory.
    ///
    /// Union of base children not pending removal, queue entries that will
    /// appear under this directory, and shadow children. When the directory
    /// itself is the target of a pending move, the move source is listed.
    pub fn list_paths(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<BTreeSet<SandboxPath>, SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        self.list_paths_rel(&rel)
    }

    pub(super) fn exists_rel(&self, rel: &SandboxPath) -> bool {
        if self.shadow_path(rel).exists() {
            return true;
        }
        match self.queue.get(rel) {
            Some(FileOp::Move { .. }) | Some(FileOp::MkDir) => true,
            Some(op) if op.is_removal() => false,
            _ => self.base_path(rel).exists(),
        }
    }

    pub(super) fn is_directory_rel(&self, rel: &SandboxPath) -> bool {
        match self.queue.get(rel) {
            Some(FileOp::MkDir) if !self.shadow_path(rel).exists() => true,
            _ => self
                .input_file_rel(rel)
                .map(|file| file.is_dir())
                .unwrap_or(false),
        }
    }

    pub(super) fn input_file_rel(&self, rel: &SandboxPath) -> Result<PathBuf, SandboxError> {
        let shadow = self.shadow_path(rel);
        if shadow.exists() {
            return Ok(shadow);
        }
        match self.queue.get(rel) {
            Some(FileOp::Move { from }) => Ok(self.base_path(from)),
            Some(op) if op.is_removal() => Err(SandboxError::NotFound(rel.clone())),
            _ => Ok(self.base_path(rel)),
        }
    }

    pub(super) fn list_paths_rel(
        &self,
        rel: &SandboxPath,
    ) -> Result<BTreeSet<SandboxPath>, SandboxError> {
        let mut paths = BTreeSet::new();

        // A directory pending a rename lists its source; a removed one
        // has no base children left
        let base_source = match self.queue.get(rel) {
            Some(FileOp::Move { from }) => Some(from.clone()),
            Some(op) if op.is_removal() => None,
            _ => Some(rel.clone()),
        };
        let base_children = match &base_source {
            Some(source) => child_names(&self.base_path(source))?,
            None => Vec::new(),
        };

        for name in base_children {
            let child = rel.join(&name);
            let removed = self.queue.get(&child).is_some_and(FileOp::is_removal);
            if !removed {
                paths.insert(child);
            }
        }

        for (queued, op) in self.queue.iter() {
            if matches!(op, FileOp::Move { .. } | FileOp::MkDir)
                && queued.parent().as_ref() == Some(rel)
            {
                paths.insert(queued.clone());
            }
        }

        for name in child_names(&self.shadow_path(rel))? {
            paths.insert(rel.join(&name));
        }

        Ok(paths)
    }
}

/// Names of a directory's entries; a missing or non-directory path has none
fn child_names(dir: &Path) -> Result<Vec<String>, SandboxError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(_) if !dir.is_dir() => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_str().ok_or_else(|| {
            SandboxError::InvalidPath(format!("Invalid UTF-8 in path: {:?}", entry.path()))
        })?;
        names.push(name.to_string());
    }
    Ok(names)
}
