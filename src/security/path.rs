use crate::sandbox::SandboxError;
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A path relative to the base tree root, normalized to `/`-separated form.
///
/// The empty path names the base root itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SandboxPath(String);

impl SandboxPath {
    /// The base root
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a relative path, normalizing `.` and `name/..` lexically.
    ///
    /// Fails if the path is absolute or climbs above the root.
    pub fn parse(raw: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let raw = raw.as_ref();
        let mut components: Vec<&str> = Vec::new();

        for component in raw.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(SandboxError::NotASandboxedDirectory(raw.to_path_buf()));
                }
                Component::ParentDir => {
                    if components.pop().is_none() {
                        return Err(SandboxError::NotASandboxedDirectory(raw.to_path_buf()));
                    }
                }
                Component::CurDir => continue,
                Component::Normal(part) => {
                    let part_str = part.to_str().ok_or_else(|| {
                        SandboxError::InvalidPath(format!("Invalid UTF-8 in path: {:?}", part))
                    })?;
                    components.push(part_str);
                }
            }
        }

        Ok(Self(components.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path, or `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rsplit_once('/') {
            Some((parent, _)) => Self(parent.to_string()),
            None => Self::root(),
        })
    }

    /// Last component, or `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(self.0.rsplit('/').next().unwrap_or(&self.0))
    }

    /// Append a single component
    pub fn join(&self, name: &str) -> Self {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    /// Component-wise prefix check; every path starts with the root
    pub fn starts_with(&self, other: &SandboxPath) -> bool {
        other.is_root()
            || self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// Resolve against a directory that mirrors the base layout
    pub fn resolve_in(&self, dir: &Path) -> PathBuf {
        if self.is_root() {
            dir.to_path_buf()
        } else {
            dir.join(&self.0)
        }
    }
}

impl fmt::Display for SandboxPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for SandboxPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Confirms that paths lie within the base tree and relativizes them.
#[derive(Debug, Clone)]
pub struct PathValidator {
    base_dir: PathBuf,
}

impl PathValidator {
    /// `base_dir` must already be absolute
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether the path names something inside the base tree.
    ///
    /// Absolute paths must start with the base directory; relative paths
    /// must not climb above it.
    pub fn is_sandboxed(&self, path: impl AsRef<Path>) -> bool {
        self.validate(path).is_ok()
    }

    /// Validate and relativize a path against the base tree
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<SandboxPath, SandboxError> {
        let path = path.as_ref();
        if path.is_absolute() {
            let relative = path
                .strip_prefix(&self.base_dir)
                .map_err(|_| SandboxError::NotASandboxedDirectory(path.to_path_buf()))?;
            SandboxPath::parse(relative).map_err(|e| match e {
                SandboxError::NotASandboxedDirectory(_) => {
                    SandboxError::NotASandboxedDirectory(path.to_path_buf())
                }
                other => other,
            })
        } else {
            SandboxPath::parse(path)
        }
    }
}
