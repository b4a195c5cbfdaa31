//! A per-thread "no blocking disk I/O here" policy, modelled on Android's
//! `StrictMode.ThreadPolicy`.
//!
//! Threads start out with unrestricted disk access. A latency sensitive
//! thread (such as the UI thread) can opt in to a strict policy with
//! [`set()`], after which [`check_read()`] and [`check_write()`] will log a
//! warning for each violation. Checks never block the I/O itself.
//!
//! Code that has no choice but to touch the disk from such a thread can
//! temporarily lift the policy with [`allow_disk_reads_and_writes()`]. The
//! returned [`PolicyGate`] restores the policy that was in effect when it was
//! acquired as soon as it is dropped, which also covers early returns via `?`
//! and unwinding panics.
//!
//! On Android the gate additionally relaxes the Java `StrictMode` thread
//! policy for the same scope.

use std::cell::Cell;
use std::marker::PhantomData;
use std::thread;

use bitflags::bitflags;

bitflags! {
    /// The kinds of disk access permitted on a thread
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DiskPolicy: u32 {
        const READS = 1 << 0;
        const WRITES = 1 << 1;
    }
}

thread_local! {
    static THREAD_POLICY: Cell<DiskPolicy> = Cell::new(DiskPolicy::all());
}

/// The disk policy of the calling thread
pub fn current() -> DiskPolicy {
    THREAD_POLICY.with(|policy| policy.get())
}

/// Replaces the disk policy of the calling thread, returning the previous policy
pub fn set(policy: DiskPolicy) -> DiskPolicy {
    THREAD_POLICY.with(|cell| cell.replace(policy))
}

fn check(needed: DiskPolicy, what: &str) -> bool {
    if current().contains(needed) {
        return true;
    }
    let thread = thread::current();
    log::warn!(
        "Thread policy violation: disk {:?} on thread {:?}: {}",
        needed,
        thread.name().unwrap_or("<unnamed>"),
        what
    );
    false
}

/// Reports whether the calling thread may read from disk, logging a violation if not
pub fn check_read(what: &str) -> bool {
    check(DiskPolicy::READS, what)
}

/// Reports whether the calling thread may write to disk, logging a violation if not
pub fn check_write(what: &str) -> bool {
    check(DiskPolicy::WRITES, what)
}

/// Permits disk reads and writes on the calling thread until the returned
/// gate is dropped.
///
/// Gates may be nested; each one restores exactly the policy that was in
/// effect when it was acquired.
pub fn allow_disk_reads_and_writes() -> PolicyGate {
    let saved = set(DiskPolicy::all());

    #[cfg(target_os = "android")]
    let strict_mode = match crate::android::StrictModeGuard::relax() {
        Ok(guard) => Some(guard),
        Err(err) => {
            log::warn!("Failed to relax StrictMode thread policy: {err}");
            None
        }
    };

    log::trace!("Disk policy relaxed (was {saved:?})");
    PolicyGate {
        saved,
        #[cfg(target_os = "android")]
        strict_mode,
        _not_send: PhantomData,
    }
}

/// Scoped relaxation of the calling thread's [`DiskPolicy`], see
/// [`allow_disk_reads_and_writes()`]
#[must_use = "the thread policy is restored as soon as the gate is dropped"]
#[derive(Debug)]
pub struct PolicyGate {
    saved: DiskPolicy,
    #[cfg(target_os = "android")]
    strict_mode: Option<crate::android::StrictModeGuard>,

    // The policy is thread-local so the gate must be released on the thread
    // that acquired it
    _not_send: PhantomData<*const ()>,
}

impl PolicyGate {
    /// The policy that will be restored when this gate is dropped
    pub fn saved(&self) -> DiskPolicy {
        self.saved
    }
}

impl Drop for PolicyGate {
    fn drop(&mut self) {
        #[cfg(target_os = "android")]
        if let Some(strict_mode) = self.strict_mode.take() {
            strict_mode.restore();
        }

        set(self.saved);
        log::trace!("Disk policy restored to {:?}", self.saved);
    }
}
