use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use crate::error::{PathError, Result};
use crate::host::{self, HostFs};
use crate::paths::{DirectoryKind, PathTriple, Suffix};
use crate::policy;
use crate::prefetch::{self, panic_message, Executor, Outcome, PrefetchHandle, ThreadExecutor};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ResolverState {
    /// `configure()` hasn't been called yet
    Unconfigured,
    /// Configured, with paths not yet published (a prefetch may be in flight)
    Prefetching,
    Resolved,
    /// Resolving failed; the failure is replayed to every caller
    Failed,
}

struct Configured {
    suffix: Suffix,
    host: Arc<dyn HostFs>,
    // Taken by the first resolution and dropped once its outcome is absorbed
    prefetch: Mutex<Option<PrefetchHandle<Result<PathTriple>>>>,
}

impl Configured {
    fn resolve_synchronously(&self) -> Result<PathTriple> {
        self.resolve_synchronously_with(policy::allow_disk_reads_and_writes)
    }

    /// Relaxing the thread policy can fail too (on Android it goes through
    /// JNI), so it happens inside the same unwind boundary as the lookups and
    /// any panic ends up latched as a failure.
    fn resolve_synchronously_with(
        &self,
        relax_policy: impl FnOnce() -> policy::PolicyGate,
    ) -> Result<PathTriple> {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _gate = relax_policy();
            host::resolve_triple(&*self.host, &self.suffix)
        }))
        .unwrap_or_else(|payload| Err(PathError::HostPanicked(panic_message(payload.as_ref()))));
        log::debug!(
            "Resolved private data directories synchronously in {:?}",
            start.elapsed()
        );
        result
    }

    /// Runs at most once per resolver, as the initializer of the published paths.
    ///
    /// Whether the prefetch can still be cancelled decides who does the work:
    /// if it never started we do it here, otherwise we wait for the worker.
    /// No lock that the worker needs is held while waiting.
    fn resolve(&self) -> Result<PathTriple> {
        let prefetch = self
            .prefetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let result = if let Some(prefetch) = prefetch {
            Self::absorb_prefetch(prefetch, || self.resolve_synchronously())
        } else {
            // Only reachable if an earlier resolution unwound after taking
            // the handle
            log::warn!("Directory prefetch handle already consumed, resolving on the calling thread");
            self.resolve_synchronously()
        };

        match &result {
            Ok(paths) => log::trace!("Private data directories: {paths:?}"),
            Err(err) => log::error!("Failed to resolve private data directories: {err}"),
        }
        result
    }

    fn absorb_prefetch(
        prefetch: PrefetchHandle<Result<PathTriple>>,
        resolve_synchronously: impl FnOnce() -> Result<PathTriple>,
    ) -> Result<PathTriple> {
        if prefetch.cancel() {
            log::debug!("Directory prefetch had not started, resolving on the calling thread");
            resolve_synchronously()
        } else {
            match prefetch.wait() {
                Outcome::Finished(result) => {
                    log::debug!("Using prefetched private data directories");
                    result
                }
                Outcome::Panicked(msg) => Err(PathError::PrefetchFailed(msg)),
                Outcome::Cancelled | Outcome::Abandoned => {
                    log::warn!("Directory prefetch never ran, resolving on the calling thread");
                    resolve_synchronously()
                }
            }
        }
    }
}

/// Resolves and caches the application's private data, database and cache
/// directories.
///
/// [`configure()`](Self::configure) kicks off a background prefetch of the
/// paths so that the (potentially slow) host lookups are usually done by the
/// time anything asks for them. The first query either picks up the
/// prefetched result or, if the prefetch hasn't started yet, cancels it and
/// does the lookups itself with disk access temporarily permitted on the
/// calling thread. Either way the lookups happen once and the result (or
/// failure) is published exactly once for all threads.
///
/// # Panics
///
/// Querying a resolver before it has been configured is a programming error
/// and panics.
pub struct Resolver {
    config: OnceLock<Configured>,
    paths: OnceLock<Result<PathTriple>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("suffix", &self.config.get().map(|config| &config.suffix))
            .field("state", &self.state())
            .finish()
    }
}

impl Resolver {
    pub const fn new() -> Self {
        Self {
            config: OnceLock::new(),
            paths: OnceLock::new(),
        }
    }

    /// Configures the resolver and starts prefetching on a background thread.
    ///
    /// See [`configure_with()`](Self::configure_with).
    pub fn configure(&self, suffix: &str, host: impl HostFs + 'static) -> Result<()> {
        self.configure_with(suffix, host, &ThreadExecutor)
    }

    /// Records the private data directory `suffix` and the `host` to query,
    /// and submits the prefetch to `executor`. Doesn't block.
    ///
    /// Configuring again with the same suffix is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidSuffix`] for an empty suffix or one that
    /// contains a path separator.
    ///
    /// # Panics
    ///
    /// Panics if the resolver was already configured with a different suffix
    pub fn configure_with(
        &self,
        suffix: &str,
        host: impl HostFs + 'static,
        executor: &dyn Executor,
    ) -> Result<()> {
        let suffix = Suffix::new(suffix)?;

        let mut initialized = false;
        let config = self.config.get_or_init(|| {
            initialized = true;
            let host_fs: Arc<dyn HostFs> = Arc::new(host);
            let prefetch = {
                let host_fs = Arc::clone(&host_fs);
                let suffix = suffix.clone();
                prefetch::spawn(executor, move || host::resolve_triple(&*host_fs, &suffix))
            };
            Configured {
                suffix: suffix.clone(),
                host: host_fs,
                prefetch: Mutex::new(Some(prefetch)),
            }
        });

        if initialized {
            log::debug!("Private data directory suffix set to {suffix}, prefetching directories");
        } else if config.suffix == suffix {
            log::debug!("Private data directory suffix already set to {suffix}");
        } else {
            panic!(
                "Private data directory suffix already set to {:?}, can't change it to {:?}",
                config.suffix, suffix
            );
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.config.get().is_some()
    }

    pub fn state(&self) -> ResolverState {
        match (self.config.get(), self.paths.get()) {
            (None, _) => ResolverState::Unconfigured,
            (Some(_), None) => ResolverState::Prefetching,
            (Some(_), Some(Ok(_))) => ResolverState::Resolved,
            (Some(_), Some(Err(_))) => ResolverState::Failed,
        }
    }

    fn configured(&self) -> &Configured {
        match self.config.get() {
            Some(config) => config,
            None => panic!(
                "The private data directory suffix must be configured before querying directory paths"
            ),
        }
    }

    /// Returns the resolved directories, resolving them first if necessary.
    ///
    /// Concurrent callers block until the first one has published the
    /// result. A failure is latched: every later call returns the same error
    /// without retrying.
    ///
    /// # Panics
    ///
    /// Panics if the resolver hasn't been configured
    pub fn ensure_resolved(&self) -> Result<&PathTriple> {
        let config = self.configured();
        self.paths
            .get_or_init(|| config.resolve())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The private directory used to store application data
    pub fn data_directory(&self) -> Result<&Path> {
        Ok(self.ensure_resolved()?.data())
    }

    /// The private directory used to store application databases
    pub fn database_directory(&self) -> Result<&Path> {
        Ok(self.ensure_resolved()?.database())
    }

    /// The private cache directory, or `None` if the host doesn't have one
    pub fn cache_directory(&self) -> Result<Option<&Path>> {
        Ok(self.ensure_resolved()?.cache())
    }

    pub fn directory(&self, kind: DirectoryKind) -> Result<Option<&Path>> {
        Ok(self.ensure_resolved()?.get(kind))
    }
}
