use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PathError, Result};

/// Identifies one of the resolved application directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryKind {
    /// The private, per-app directory named by the configured [`Suffix`]
    Data,
    /// The directory that holds the application's private databases
    Database,
    /// The application's private cache directory, if the host has one
    Cache,
}

/// Name of the application's private data sub-directory.
///
/// Android's `Context.getDir()` rejects names containing a path separator,
/// so the same restriction is enforced here, up front, for every host.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Suffix(String);

impl Suffix {
    pub fn new(suffix: impl Into<String>) -> Result<Self> {
        let suffix = suffix.into();
        if suffix.is_empty() || suffix.contains(std::path::is_separator) {
            return Err(PathError::InvalidSuffix(suffix));
        }
        Ok(Self(suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Suffix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The resolved set of application directories.
///
/// A `PathTriple` is built once, by whichever thread wins the race to resolve
/// it, and is immutable after that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTriple {
    data: PathBuf,
    database: PathBuf,
    cache: Option<PathBuf>,
}

impl PathTriple {
    pub fn new(data: PathBuf, database: PathBuf, cache: Option<PathBuf>) -> Self {
        Self {
            data,
            database,
            cache,
        }
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    /// `None` when the host reported no cache directory
    pub fn cache(&self) -> Option<&Path> {
        self.cache.as_deref()
    }

    pub fn get(&self, kind: DirectoryKind) -> Option<&Path> {
        match kind {
            DirectoryKind::Data => Some(self.data()),
            DirectoryKind::Database => Some(self.database()),
            DirectoryKind::Cache => self.cache(),
        }
    }
}
