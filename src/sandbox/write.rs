use super::{FileOp, Sandbox, SandboxError};
use crate::security::SandboxPath;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Modifiers for [`Sandbox::delete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOption {
    /// Delete a directory's logical children first
    Recursive,
    /// Don't emit a per-path debug event
    Quiet,
}

impl Sandbox {
    /// Stage a new version of `path` and return the shadow file to write it to.
    ///
    /// Parent directories in the shadow store are created.
    pub fn output_file(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        self.output_file_rel(&rel)
    }

    /// Open a staged version of `path` for writing
    pub fn file_output_stream(
        &mut self,
        path: impl AsRef<Path>,
        append: bool,
    ) -> Result<File, SandboxError> {
        let shadow = self.output_file(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(shadow)?;
        Ok(file)
    }

    /// Stage `contents` as the new version of `path`
    pub fn write(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<(), SandboxError> {
        let shadow = self.output_file(path)?;
        fs::write(shadow, contents)?;
        Ok(())
    }

    /// Mark `path` as deleted; the base file goes away on commit.
    ///
    /// A directory with logical children is only deleted with
    /// [`DeleteOption::Recursive`]; otherwise this fails with
    /// [`SandboxError::DirectoryNotEmpty`].
    pub fn delete(
        &mut self,
        path: impl AsRef<Path>,
        options: &[DeleteOption],
    ) -> Result<(), SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        let quiet = options.contains(&DeleteOption::Quiet);

        if self.is_directory_rel(&rel) {
            if options.contains(&DeleteOption::Recursive) {
                return self.remove_recursive_rel(&rel, quiet);
            }
            if !self.list_paths_rel(&rel)?.is_empty() {
                return Err(SandboxError::DirectoryNotEmpty(rel));
            }
        }

        self.delete_rel(&rel, quiet)
    }

    /// Delete a directory's logical contents, then the directory itself
    pub fn remove_recursive(&mut self, path: impl AsRef<Path>) -> Result<(), SandboxError> {
        let rel = self.ensure_valid_path(path)?;
        self.remove_recursive_rel(&rel, false)
    }

    /// Rename a file, either within the sandbox or from outside it.
    ///
    /// A staged source is renamed within the shadow store. An unstaged base
    /// source is recorded as a move and renamed on commit. An external
    /// source must be absolute and is renamed straight into the shadow
    /// store. Returns false when a physical rename fails or there is
    /// nothing to move.
    pub fn move_file(
        &mut self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<bool, SandboxError> {
        let from = from.as_ref();
        let to_rel = self.ensure_valid_path(to)?;

        match self.ensure_valid_path(from) {
            Ok(from_rel) => self.move_file_rel(&from_rel, &to_rel),
            Err(SandboxError::NotASandboxedDirectory(_)) if from.is_absolute() => {
                self.move_external(from, &to_rel)
            }
            Err(SandboxError::NotASandboxedDirectory(_)) => {
                Err(SandboxError::AbsolutePathRequired(from.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    /// Rename a directory as per-entry moves bracketed by mkdir/rmdir markers.
    ///
    /// Children are moved one at a time; a failed child does not stop the
    /// rest and nothing is rolled back. Returns false if any child failed.
    pub fn move_directory(
        &mut self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<bool, SandboxError> {
        let from = from.as_ref();
        let to = to.as_ref();
        let from_rel = self.ensure_valid_path(from)?;
        let to_rel = self.ensure_valid_path(to)?;

        if !self.is_directory_rel(&from_rel) {
            return Err(SandboxError::NotASandboxedDirectory(from.to_path_buf()));
        }
        if self.exists_rel(&to_rel) && !self.is_directory_rel(&to_rel) {
            return Err(SandboxError::NotASandboxedDirectory(to.to_path_buf()));
        }
        if to_rel.starts_with(&from_rel) {
            return Err(SandboxError::InvalidPath(format!(
                "Cannot move {} into itself ({})",
                from_rel, to_rel
            )));
        }

        self.move_directory_rel(&from_rel, &to_rel)
    }

    fn output_file_rel(&mut self, rel: &SandboxPath) -> Result<PathBuf, SandboxError> {
        let shadow = self.shadow_path(rel);
        if let Some(parent) = shadow.parent() {
            fs::create_dir_all(parent)?;
        }

        self.queue.replace(rel.clone(), FileOp::Add);
        self.persist();
        tracing::debug!(path = %rel, "Staged write");
        Ok(shadow)
    }

    fn delete_rel(&mut self, rel: &SandboxPath, quiet: bool) -> Result<(), SandboxError> {
        remove_shadow(&self.shadow_path(rel))?;

        self.queue.replace(rel.clone(), FileOp::Delete);
        self.persist();
        if !quiet {
            tracing::debug!(path = %rel, "Staged delete");
        }
        Ok(())
    }

    fn remove_recursive_rel(&mut self, rel: &SandboxPath, quiet: bool) -> Result<(), SandboxError> {
        for child in self.list_paths_rel(rel)? {
            if self.is_directory_rel(&child) {
                self.remove_recursive_rel(&child, quiet)?;
            } else {
                self.delete_rel(&child, quiet)?;
            }
        }
        self.delete_rel(rel, quiet)
    }

    fn move_file_rel(
        &mut self,
        from: &SandboxPath,
        to: &SandboxPath,
    ) -> Result<bool, SandboxError> {
        if from == to {
            return Ok(self.exists_rel(from));
        }

        let shadow_from = self.shadow_path(from);
        let base_from = self.base_path(from);

        if shadow_from.exists() {
            let shadow_to = self.shadow_path(to);
            if let Err(e) = rename_creating_parent(&shadow_from, &shadow_to) {
                tracing::warn!(from = %from, to = %to, error = %e, "Failed to move staged file");
                return Ok(false);
            }

            self.queue.replace(to.clone(), FileOp::Add);
            if base_from.exists() {
                self.queue.replace(from.clone(), FileOp::Delete);
            } else {
                self.queue.remove(from);
            }
            self.persist();
            tracing::debug!(from = %from, to = %to, "Moved staged file");
            return Ok(true);
        }

        // The source is itself waiting on a rename. Forward it while the
        // base source is untouched until commit, else stage a snapshot of it.
        if let Some(FileOp::Move { from: source }) = self.queue.get(from).cloned() {
            let op = if self.queue.get(&source) == Some(&FileOp::MovedOut) {
                if source == *to {
                    // Back where it started
                    self.queue.remove(to);
                    self.queue.remove(from);
                    self.persist();
                    return Ok(true);
                }
                FileOp::Move { from: source }
            } else {
                let shadow_to = self.shadow_path(to);
                if let Err(e) = copy_creating_parent(&self.base_path(&source), &shadow_to) {
                    tracing::warn!(
                        from = %from,
                        to = %to,
                        error = %e,
                        "Failed to stage moved file"
                    );
                    return Ok(false);
                }
                FileOp::Add
            };

            self.queue.replace(to.clone(), op);
            if base_from.exists() {
                self.queue.replace(from.clone(), FileOp::Delete);
            } else {
                self.queue.remove(from);
            }
            self.persist();
            tracing::debug!(from = %from, to = %to, "Forwarded pending move");
            return Ok(true);
        }

        let removed = self.queue.get(from).is_some_and(FileOp::is_removal);
        if base_from.exists() && !removed {
            self.queue.replace(to.clone(), FileOp::Move { from: from.clone() });
            self.queue.replace(from.clone(), FileOp::MovedOut);
            self.persist();
            tracing::debug!(from = %from, to = %to, "Staged move");
            return Ok(true);
        }

        tracing::debug!(from = %from, "Nothing to move");
        Ok(false)
    }

    fn move_external(&mut self, from: &Path, to: &SandboxPath) -> Result<bool, SandboxError> {
        let shadow_to = self.shadow_path(to);
        if let Err(e) = rename_creating_parent(from, &shadow_to) {
            tracing::warn!(
                from = %from.display(),
                to = %to,
                error = %e,
                "Failed to move external file in"
            );
            return Ok(false);
        }

        self.queue.replace(to.clone(), FileOp::Add);
        self.persist();
        tracing::debug!(from = %from.display(), to = %to, "Moved external file in");
        Ok(true)
    }

    fn move_directory_rel(
        &mut self,
        from: &SandboxPath,
        to: &SandboxPath,
    ) -> Result<bool, SandboxError> {
        self.queue.replace(to.clone(), FileOp::MkDir);
        self.persist();

        let mut ok = true;
        for child in self.list_paths_rel(from)? {
            let Some(name) = child.file_name() else {
                continue;
            };
            let target = to.join(name);
            let moved = if self.is_directory_rel(&child) {
                self.move_directory_rel(&child, &target)?
            } else {
                self.move_file_rel(&child, &target)?
            };
            ok &= moved;
        }

        // Children have left the shadow directory, if there was one
        let shadow_from = self.shadow_path(from);
        if shadow_from.is_dir() {
            if let Err(e) = fs::remove_dir(&shadow_from) {
                tracing::warn!(path = %from, error = %e, "Failed to remove staged directory");
            }
        }

        self.queue.replace(from.clone(), FileOp::RmDir);
        self.persist();
        tracing::debug!(from = %from, to = %to, ok, "Moved directory");
        Ok(ok)
    }
}

fn remove_shadow(shadow: &Path) -> io::Result<()> {
    let result = if shadow.is_dir() {
        fs::remove_dir_all(shadow)
    } else {
        fs::remove_file(shadow)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn copy_creating_parent(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}

pub(super) fn rename_creating_parent(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)
}
