use crate::security::SandboxPath;
use indexmap::IndexMap;
use serde::Serialize;

/// A pending change to one path in the base tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FileOp {
    /// Remove the base file on commit
    Delete,
    /// Content lives in the shadow store; move it into base on commit
    Add,
    /// Rename `from` within base on commit
    Move { from: SandboxPath },
    /// Renamed elsewhere by a pending `Move`; nothing to do but report removal
    MovedOut,
    MkDir,
    RmDir,
}

impl FileOp {
    /// Opcode character used in the persisted log
    pub fn opcode(&self) -> char {
        match self {
            FileOp::Delete => 'D',
            FileOp::Add => 'A',
            FileOp::MovedOut => 'O',
            FileOp::MkDir => 'K',
            FileOp::RmDir => 'L',
            FileOp::Move { .. } => 'M',
        }
    }

    /// Whether the path reads as absent until commit
    pub fn is_removal(&self) -> bool {
        matches!(self, FileOp::Delete | FileOp::MovedOut | FileOp::RmDir)
    }

    /// Short label for listings and log output
    pub fn label(&self) -> &'static str {
        match self {
            FileOp::Delete => "delete",
            FileOp::Add => "add",
            FileOp::Move { .. } => "move",
            FileOp::MovedOut => "moved out",
            FileOp::MkDir => "mkdir",
            FileOp::RmDir => "rmdir",
        }
    }
}

/// Ordered map of pending operations, at most one per path.
///
/// Replay order is insertion order. Re-recording a path moves it to the back.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct WorkQueue {
    entries: IndexMap<SandboxPath, FileOp>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any entry for `path` and append `op` at the end
    pub fn replace(&mut self, path: SandboxPath, op: FileOp) {
        self.entries.shift_remove(&path);
        self.entries.insert(path, op);
    }

    /// Remove the entry for `path`, keeping the order of the rest
    pub fn remove(&mut self, path: &SandboxPath) -> Option<FileOp> {
        self.entries.shift_remove(path)
    }

    pub fn get(&self, path: &SandboxPath) -> Option<&FileOp> {
        self.entries.get(path)
    }

    /// Entries in replay order
    pub fn iter(&self) -> impl Iterator<Item = (&SandboxPath, &FileOp)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// IndexMap equality ignores order; replay order matters here.
impl PartialEq for WorkQueue {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.entries.iter().eq(other.entries.iter())
    }
}

impl Eq for WorkQueue {}

impl FromIterator<(SandboxPath, FileOp)> for WorkQueue {
    fn from_iter<I: IntoIterator<Item = (SandboxPath, FileOp)>>(iter: I) -> Self {
        let mut queue = WorkQueue::new();
        for (path, op) in iter {
            queue.replace(path, op);
        }
        queue
    }
}
