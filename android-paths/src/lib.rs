//! Private data directory paths for Rust code running inside an Android
//! application.
//!
//! Looking up an application's directories goes through the Java framework
//! (`Context.getDir()`, `Context.getDatabasePath()`, `Context.getCacheDir()`)
//! and can block on disk I/O, which is something you don't want to do on the
//! UI thread. This crate prefetches the paths on a background thread as soon
//! as the private data directory suffix is known and then serves them, from
//! any thread, without further synchronization.
//!
//! ```no_run
//! # fn main() -> android_paths::Result<()> {
//! android_paths::set_private_data_directory_suffix(
//!     "app_priv",
//!     android_paths::DirectoryHost::new("/data/data/com.example.app"),
//! )?;
//!
//! // ...later, on any thread
//! let data = android_paths::data_directory()?;
//! let cache = android_paths::cache_directory()?;
//! # let _ = (data, cache);
//! # Ok(())
//! # }
//! ```
//!
//! If the first query arrives before the background prefetch has started, the
//! prefetch is cancelled and the lookups are done on the calling thread with
//! the thread's [disk policy](policy) temporarily relaxed. Either way the
//! lookups only happen once and every caller sees the same result.
//!
//! The process-wide functions in this module wrap a static [`Resolver`].
//! Applications that prefer to own their state can use a [`Resolver`]
//! directly.
//!
//! # Panics
//!
//! Querying a directory before the suffix has been set is a programming error
//! and panics, as does setting a different suffix a second time.

use std::path::Path;

mod error;
pub use error::{PathError, Result};

mod host;
pub use host::{DirectoryHost, HostFs};

mod paths;
pub use paths::{DirectoryKind, PathTriple, Suffix};

pub mod policy;
pub mod prefetch;

mod resolver;
pub use resolver::{Resolver, ResolverState};

#[cfg(target_os = "android")]
mod jni_utils;

#[cfg(target_os = "android")]
mod android;
#[cfg(target_os = "android")]
pub use android::AndroidHost;

static RESOLVER: Resolver = Resolver::new();

/// The process-wide resolver used by the free functions of this crate
pub fn resolver() -> &'static Resolver {
    &RESOLVER
}

/// Sets the name of the application's private data directory and starts
/// prefetching all directory paths from `host` in the background.
///
/// This should be called once, early, before any of the directory queries.
///
/// # Errors
///
/// Returns [`PathError::InvalidSuffix`] if `suffix` is empty or contains a
/// path separator.
///
/// # Panics
///
/// Panics if a different suffix has already been set
pub fn set_private_data_directory_suffix(suffix: &str, host: impl HostFs + 'static) -> Result<()> {
    RESOLVER.configure(suffix, host)
}

/// Like [`set_private_data_directory_suffix()`] for the currently running
/// Android application, using the `Context` published via `ndk_context`
#[cfg(target_os = "android")]
pub fn set_private_data_directory_suffix_for_current_app(suffix: &str) -> Result<()> {
    RESOLVER.configure(suffix, AndroidHost::from_current_context()?)
}

/// The private directory used to store application data
pub fn data_directory() -> Result<&'static Path> {
    RESOLVER.data_directory()
}

/// The private directory used to store application databases
pub fn database_directory() -> Result<&'static Path> {
    RESOLVER.database_directory()
}

/// The private cache directory, or `None` if the host doesn't provide one
pub fn cache_directory() -> Result<Option<&'static Path>> {
    RESOLVER.cache_directory()
}

#[test]
fn test_resolver_is_send_sync() {
    fn needs_send_sync<T: Send + Sync>() {}
    needs_send_sync::<Resolver>();
}
