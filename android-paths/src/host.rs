use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::paths::{PathTriple, Suffix};
use crate::policy;

/// The directory lookups that the resolver needs from the application's host
/// environment.
///
/// Implementations may block on disk I/O. The resolver only calls them from a
/// worker thread, or from a caller's thread while holding a
/// [`PolicyGate`](crate::policy::PolicyGate).
pub trait HostFs: Send + Sync {
    /// Returns the private, per-app directory named by `suffix`, creating it
    /// if it doesn't exist yet
    fn private_data_dir(&self, suffix: &Suffix) -> Result<PathBuf>;

    /// Returns the directory that contains the application's private databases
    fn database_parent_dir(&self) -> Result<PathBuf>;

    /// Returns the application's private cache directory, or `None` if the
    /// host doesn't provide one
    fn cache_dir(&self) -> Result<Option<PathBuf>>;
}

impl<T: HostFs + ?Sized> HostFs for Arc<T> {
    fn private_data_dir(&self, suffix: &Suffix) -> Result<PathBuf> {
        (**self).private_data_dir(suffix)
    }

    fn database_parent_dir(&self) -> Result<PathBuf> {
        (**self).database_parent_dir()
    }

    fn cache_dir(&self) -> Result<Option<PathBuf>> {
        (**self).cache_dir()
    }
}

impl<T: HostFs + ?Sized> HostFs for Box<T> {
    fn private_data_dir(&self, suffix: &Suffix) -> Result<PathBuf> {
        (**self).private_data_dir(suffix)
    }

    fn database_parent_dir(&self) -> Result<PathBuf> {
        (**self).database_parent_dir()
    }

    fn cache_dir(&self) -> Result<Option<PathBuf>> {
        (**self).cache_dir()
    }
}

/// Runs the three host lookups. This is the unit of work shared by the
/// background prefetch and the synchronous fallback.
pub(crate) fn resolve_triple(host: &dyn HostFs, suffix: &Suffix) -> Result<PathTriple> {
    let data = host.private_data_dir(suffix)?;
    let database = host.database_parent_dir()?;
    let cache = host.cache_dir()?;
    Ok(PathTriple::new(data, database, cache))
}

// Hosts only hand out the path of a named database file so we ask for an
// arbitrary one and take its parent
pub(crate) const NOMINAL_DATABASE: &str = "placeholder.db";

/// A [`HostFs`] that lays out application directories under a plain root
/// directory, the same way the Android framework lays them out under
/// `/data/data/<package>`:
///
/// - `<root>/app_<suffix>` for private data (created on demand)
/// - `<root>/databases` for databases
/// - `<root>/cache` for the cache (absent unless it already exists)
///
/// This is useful for running code that depends on these paths on a desktop
/// host, or for tests.
#[derive(Debug, Clone)]
pub struct DirectoryHost {
    root: PathBuf,
}

impl DirectoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.root.join("databases").join(name)
    }
}

impl HostFs for DirectoryHost {
    fn private_data_dir(&self, suffix: &Suffix) -> Result<PathBuf> {
        let dir = self.root.join(format!("app_{suffix}"));
        policy::check_write("DirectoryHost::private_data_dir");

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o771);
        }
        builder.create(&dir)?;
        Ok(dir)
    }

    fn database_parent_dir(&self) -> Result<PathBuf> {
        let db = self.database_path(NOMINAL_DATABASE);
        // `database_path` always joins a file name onto a directory
        Ok(db.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    fn cache_dir(&self) -> Result<Option<PathBuf>> {
        let dir = self.root.join("cache");
        policy::check_read("DirectoryHost::cache_dir");
        Ok(dir.is_dir().then_some(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_host_layout() {
        let root = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(root.path());
        let suffix = Suffix::new("app_priv").unwrap();

        let data = host.private_data_dir(&suffix).unwrap();
        assert_eq!(data, root.path().join("app_app_priv"));
        assert!(data.is_dir());

        assert_eq!(
            host.database_parent_dir().unwrap(),
            root.path().join("databases")
        );
        assert_eq!(host.cache_dir().unwrap(), None);

        fs::create_dir(root.path().join("cache")).unwrap();
        assert_eq!(host.cache_dir().unwrap(), Some(root.path().join("cache")));
    }

    #[test]
    fn database_parent_is_parent_of_nominal_database() {
        let host = DirectoryHost::new("/data/data/com.example");
        let nominal = host.database_path(NOMINAL_DATABASE);
        assert_eq!(nominal.file_name().unwrap(), NOMINAL_DATABASE);
        assert_eq!(
            nominal.parent().unwrap(),
            host.database_parent_dir().unwrap()
        );
    }

    #[test]
    fn private_data_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(root.path());
        let suffix = Suffix::new("priv").unwrap();
        let first = host.private_data_dir(&suffix).unwrap();
        fs::write(first.join("marker"), b"x").unwrap();
        let second = host.private_data_dir(&suffix).unwrap();
        assert_eq!(first, second);
        assert!(second.join("marker").exists());
    }

    #[test]
    fn resolve_triple_stops_at_first_failure() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();
        let host = DirectoryHost::new(&file);
        let suffix = Suffix::new("priv").unwrap();
        assert!(matches!(
            resolve_triple(&host, &suffix),
            Err(crate::PathError::HostUnavailable(_))
        ));
    }
}
