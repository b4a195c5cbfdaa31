//! One-shot background work that can be cancelled until it starts running.
//!
//! A [`PrefetchHandle`] is shared between the thread that submitted the work
//! and the worker that executes it. The only synchronization between the two
//! is an atomic state word, which decides the race between [`PrefetchHandle::cancel()`]
//! and the worker claiming the job, plus a mutex + condvar pair that carries
//! the result back to a waiter.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;
const ABANDONED: u8 = 4;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TaskState {
    /// Submitted but not yet picked up by a worker
    Pending,
    /// A worker claimed the job and is executing it
    Running,
    /// The job completed (possibly by panicking) and its outcome is available
    Finished,
    /// [`PrefetchHandle::cancel()`] won the race against the worker
    Cancelled,
    /// The executor dropped the job without ever running it
    Abandoned,
}

impl TaskState {
    fn from_raw(state: u8) -> Self {
        match state {
            PENDING => TaskState::Pending,
            RUNNING => TaskState::Running,
            FINISHED => TaskState::Finished,
            CANCELLED => TaskState::Cancelled,
            ABANDONED => TaskState::Abandoned,
            _ => unreachable!("invalid prefetch task state {state}"),
        }
    }
}

/// What a waiter learns about a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Finished(T),
    /// The job panicked on the worker thread, with the panic message
    Panicked(String),
    Cancelled,
    Abandoned,
}

/// A boxed job, as handed to an [`Executor`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run background jobs.
///
/// An executor is free to drop a job instead of running it, in which case the
/// corresponding task is marked [`TaskState::Abandoned`].
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs each job on its own, newly spawned, thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) {
        if let Err(err) = thread::Builder::new()
            .name("android-paths-prefetch".into())
            .spawn(job)
        {
            // The job (and its task) get dropped along with the failed builder
            log::error!("Failed to spawn prefetch thread: {err}");
        }
    }
}

enum Slot<T> {
    Empty,
    Done(Outcome<T>),
}

struct Shared<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn complete(&self, outcome: Outcome<T>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Slot::Done(outcome);
        self.state.store(FINISHED, Ordering::Release);
        self.cond.notify_all();
    }

    fn wake_waiters(&self) {
        // Taking the lock orders this wake up after any waiter that already
        // checked the state and is about to block
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_all();
    }
}

/// The worker side of a task. Dropping it without calling `run()` abandons
/// the task.
struct Dispatch<T, F> {
    shared: Arc<Shared<T>>,
    work: Option<F>,
}

impl<T, F> Dispatch<T, F>
where
    F: FnOnce() -> T,
{
    fn run(mut self) {
        if self
            .shared
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("Prefetch cancelled before it could run");
            return;
        }
        log::trace!("Prefetch running");

        let Some(work) = self.work.take() else {
            unreachable!("prefetch job dispatched twice");
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(value) => Outcome::Finished(value),
            Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
        };
        self.shared.complete(outcome);
        log::trace!("Prefetch finished");
    }
}

impl<T, F> Drop for Dispatch<T, F> {
    fn drop(&mut self) {
        if self
            .shared
            .state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::warn!("Prefetch job was dropped by its executor without running");
            self.shared.wake_waiters();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// A cancellable reference to a job submitted with [`spawn()`]
pub struct PrefetchHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> std::fmt::Debug for PrefetchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Submits `work` to `executor` and returns a handle for cancelling it or
/// waiting for its result
pub fn spawn<T, F>(executor: &dyn Executor, work: F) -> PrefetchHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let shared = Arc::new(Shared {
        state: AtomicU8::new(PENDING),
        slot: Mutex::new(Slot::Empty),
        cond: Condvar::new(),
    });
    let dispatch = Dispatch {
        shared: Arc::clone(&shared),
        work: Some(work),
    };
    executor.execute(Box::new(move || dispatch.run()));
    PrefetchHandle { shared }
}

impl<T> PrefetchHandle<T> {
    pub fn state(&self) -> TaskState {
        TaskState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Prevents the job from running.
    ///
    /// Returns `true` if the job was still pending and will now never run,
    /// `false` if a worker had already claimed it (or it was already
    /// cancelled or abandoned). A running job is never interrupted.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .shared
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            log::trace!("Prefetch cancelled");
            self.shared.wake_waiters();
        }
        cancelled
    }
}

impl<T: Clone> PrefetchHandle<T> {
    /// Blocks until the job has an outcome.
    ///
    /// Returns immediately for a cancelled or abandoned task. Waiting on a
    /// task that is still pending blocks until a worker runs it.
    pub fn wait(&self) -> Outcome<T> {
        let mut slot = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Slot::Done(outcome) = &*slot {
                return outcome.clone();
            }
            match self.state() {
                TaskState::Cancelled => return Outcome::Cancelled,
                TaskState::Abandoned => return Outcome::Abandoned,
                _ => {}
            }
            slot = self
                .shared
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Holds on to submitted jobs until a test decides to run (or drop) them
    #[derive(Default)]
    pub(crate) struct ManualExecutor {
        jobs: Mutex<Vec<Job>>,
    }

    impl ManualExecutor {
        pub(crate) fn run_all(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
            for job in jobs {
                job();
            }
        }

        pub(crate) fn take_job(&self) -> Job {
            self.jobs.lock().unwrap().pop().expect("no job submitted")
        }

        pub(crate) fn pending(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        pub(crate) fn drop_all(&self) {
            self.jobs.lock().unwrap().clear();
        }
    }

    impl Executor for ManualExecutor {
        fn execute(&self, job: Job) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    #[test]
    fn cancel_before_dispatch_skips_work() {
        let executor = ManualExecutor::default();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = spawn(&executor, move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(handle.state(), TaskState::Pending);
        assert!(handle.cancel());
        assert!(!handle.cancel());
        executor.run_all();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), TaskState::Cancelled);
        assert_eq!(handle.wait(), Outcome::Cancelled);
    }

    #[test]
    fn cancel_after_completion_fails() {
        let executor = ManualExecutor::default();
        let handle = spawn(&executor, || 7);
        executor.run_all();

        assert!(!handle.cancel());
        assert_eq!(handle.state(), TaskState::Finished);
        assert_eq!(handle.wait(), Outcome::Finished(7));
        // The result stays available
        assert_eq!(handle.wait(), Outcome::Finished(7));
    }

    #[test]
    fn cancel_while_running_does_not_interrupt() {
        let executor = ManualExecutor::default();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = spawn(&executor, move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            "done"
        });

        let job = executor.take_job();
        let worker = thread::spawn(job);
        started_rx.recv().unwrap();

        assert_eq!(handle.state(), TaskState::Running);
        assert!(!handle.cancel());
        release_tx.send(()).unwrap();

        assert_eq!(handle.wait(), Outcome::Finished("done"));
        worker.join().unwrap();
    }

    #[test]
    fn wait_blocks_until_worker_publishes() {
        let executor = ManualExecutor::default();
        let handle = spawn(&executor, || String::from("/data/app_priv"));
        let job = executor.take_job();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            job();
        });
        assert_eq!(
            handle.wait(),
            Outcome::Finished(String::from("/data/app_priv"))
        );
        worker.join().unwrap();
    }

    #[test]
    fn dropped_job_is_abandoned() {
        let executor = ManualExecutor::default();
        let handle = spawn(&executor, || 1);
        executor.drop_all();

        assert_eq!(handle.state(), TaskState::Abandoned);
        assert!(!handle.cancel());
        assert_eq!(handle.wait(), Outcome::Abandoned);
    }

    #[test]
    fn dropped_job_wakes_waiter() {
        let executor = Arc::new(ManualExecutor::default());
        let handle = spawn(&*executor, || 1);
        let dropper = {
            let executor = Arc::clone(&executor);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                executor.drop_all();
            })
        };
        assert_eq!(handle.wait(), Outcome::Abandoned);
        dropper.join().unwrap();
    }

    #[test]
    fn panicking_job_reports_message() {
        let executor = ManualExecutor::default();
        let handle = spawn(&executor, || -> u32 { panic!("host went away") });
        executor.run_all();

        assert_eq!(handle.state(), TaskState::Finished);
        assert_eq!(handle.wait(), Outcome::Panicked("host went away".into()));
    }

    #[test]
    fn thread_executor_runs_job() {
        let handle = spawn(&ThreadExecutor, || {
            thread::current().name().map(str::to_owned)
        });
        assert_eq!(
            handle.wait(),
            Outcome::Finished(Some("android-paths-prefetch".into()))
        );
    }
}
