use super::write::rename_creating_parent;
use super::{FileOp, Sandbox, SandboxError};
use crate::security::SandboxPath;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Outcome of applying the work queue to the base tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitReport {
    /// Entries applied without error
    pub applied: usize,
    /// Entries whose physical operation failed
    pub failures: Vec<CommitFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitFailure {
    pub path: SandboxPath,
    pub op: FileOp,
    pub error: String,
}

impl CommitReport {
    /// True when every entry was applied
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Sandbox {
    /// Apply all pending changes to the base tree, then discard staged state
    pub fn commit(&mut self) -> Result<CommitReport, SandboxError> {
        self.commit_with(|_| {}, |_| {})
    }

    /// Apply all pending changes in queue order.
    ///
    /// `on_written` receives each base file that was added or renamed into
    /// place, `on_removed` each base file that went away. Failed entries are
    /// logged and reported but do not stop the commit; applied entries are
    /// not rolled back. Staged state is discarded afterwards either way.
    pub fn commit_with<W, R>(
        &mut self,
        mut on_written: W,
        mut on_removed: R,
    ) -> Result<CommitReport, SandboxError>
    where
        W: FnMut(&Path),
        R: FnMut(&Path),
    {
        let mut report = CommitReport::default();
        tracing::debug!(entries = self.queue.len(), "Committing work queue");

        for (rel, op) in self.queue.iter() {
            let target = self.base_path(rel);
            let result = match op {
                FileOp::Delete => {
                    let result = remove_base(&target);
                    on_removed(&target);
                    result
                }
                FileOp::Add => {
                    let result = rename_creating_parent(&self.shadow_path(rel), &target);
                    on_written(&target);
                    result
                }
                FileOp::Move { from } => {
                    let result = rename_creating_parent(&self.base_path(from), &target);
                    on_written(&target);
                    result
                }
                FileOp::MovedOut => {
                    on_removed(&target);
                    Ok(())
                }
                FileOp::MkDir => fs::create_dir_all(&target),
                FileOp::RmDir => match fs::remove_dir(&target) {
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::warn!(path = %rel, op = op.label(), error = %e, "Commit entry failed");
                    report.failures.push(CommitFailure {
                        path: rel.clone(),
                        op: op.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            applied = report.applied,
            failed = report.failures.len(),
            "Committed work queue"
        );

        self.discard()?;
        Ok(report)
    }
}

/// Remove a base file or empty directory; already gone is fine
fn remove_base(target: &Path) -> io::Result<()> {
    let result = if target.is_dir() {
        fs::remove_dir(target)
    } else {
        fs::remove_file(target)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
