use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::TaskError;
use crate::job::Job;

enum Outcome<R> {
    Pending,
    Finished(std::thread::Result<R>),
    Abandoned,
}

struct Completion<R> {
    done: AtomicBool,
    outcome: Mutex<Outcome<R>>,
    cvar: Condvar,
}

impl<R> Completion<R> {
    fn lock(&self) -> MutexGuard<'_, Outcome<R>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Outcome<R>) {
        let mut guard = self.lock();
        if matches!(*guard, Outcome::Pending) {
            *guard = outcome;
            self.done.store(true, Ordering::Release);
            self.cvar.notify_all();
        }
    }
}

/// The result side of a task handed to [`WorkerPool::submit`](crate::WorkerPool::submit).
///
/// `TaskHandle` lets the submitting thread poll for completion, block until
/// the task has run, or block with a timeout. A panic inside the task is
/// caught on the worker and comes back here as [`TaskError::Panicked`].
pub struct TaskHandle<R> {
    completion: Arc<Completion<R>>,
}

impl<R> TaskHandle<R> {
    /// Check whether the task has finished without blocking.
    pub fn is_complete(&self) -> bool {
        self.completion.done.load(Ordering::Acquire)
    }

    /// Block until the task has run and return what it produced.
    pub fn wait(self) -> Result<R, TaskError> {
        let mut guard = self.completion.lock();
        while matches!(*guard, Outcome::Pending) {
            guard = self
                .completion
                .cvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match std::mem::replace(&mut *guard, Outcome::Abandoned) {
            Outcome::Finished(Ok(value)) => Ok(value),
            Outcome::Finished(Err(payload)) => Err(TaskError::Panicked(panic_message(&*payload))),
            Outcome::Abandoned | Outcome::Pending => Err(TaskError::Abandoned),
        }
    }

    /// Block for at most `timeout`.
    ///
    /// Returns `true` if the task finished in time; the value can then be
    /// collected with [`wait`](Self::wait) without blocking.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_complete() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.completion.lock();
        while matches!(*guard, Outcome::Pending) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .completion
                .cvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// heap-owned one-shot task behind a submitted closure
struct Task<F, R> {
    func: Option<F>,
    completion: Arc<Completion<R>>,
}

impl<F, R> Drop for Task<F, R> {
    fn drop(&mut self) {
        // never ran: release whoever is waiting
        if self.func.is_some() {
            self.completion.settle(Outcome::Abandoned);
        }
    }
}

fn run_task<F, R>(payload: *mut ())
where
    F: FnOnce() -> R,
{
    // SAFETY: payload is the Box<Task<F, R>> leaked in `package`, alive until
    // drop_task runs after this returns
    let task = unsafe { &mut *(payload as *mut Task<F, R>) };
    if let Some(func) = task.func.take() {
        let result = panic::catch_unwind(AssertUnwindSafe(func));
        task.completion.settle(Outcome::Finished(result));
    }
}

fn drop_task<F, R>(payload: *mut ()) {
    // SAFETY: called exactly once, as the job's cleanup
    drop(unsafe { Box::from_raw(payload as *mut Task<F, R>) });
}

// box `func` into an owned job plus the handle that observes it
pub(crate) fn package<F, R>(func: F) -> (Job, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let completion = Arc::new(Completion {
        done: AtomicBool::new(false),
        outcome: Mutex::new(Outcome::Pending),
        cvar: Condvar::new(),
    });
    let task = Box::new(Task {
        func: Some(func),
        completion: Arc::clone(&completion),
    });

    let payload = Box::into_raw(task) as *mut ();
    // SAFETY: the task is Send, heap-owned, and freed only by drop_task
    let job = unsafe { Job::owned(run_task::<F, R>, payload, drop_task::<F, R>) };
    (job, TaskHandle { completion })
}
