use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::job::{CleanupFn, Job, JobFn};
use crate::mpmc_queue::MpmcQueue;
use crate::padded_type::Padded;
use crate::startup_latch::StartupLatch;
use crate::task_handle::{self, TaskHandle};
use crate::worker::{self, spawn_worker};

// id reported for jobs run on a thread that is not a worker
const CALLER: usize = usize::MAX;

pub(crate) struct Shared {
    pub(crate) queue: MpmcQueue<Job>,
    pub(crate) stop: Padded<AtomicBool>,
    pub(crate) spin_loops: Padded<AtomicU32>,
    // submitters between their stop check and the end of their queue push
    in_flight: Padded<AtomicUsize>,
}

/// A fixed set of worker threads fed from one bounded lock-free job queue.
///
/// Idle workers spin on the queue for a bounded number of polls and then
/// fall back to yielding, so a job pushed with [`enqueue`](Self::enqueue) is
/// usually picked up without any thread having to be woken.
///
/// There are two ways in:
/// - [`enqueue`](Self::enqueue) / [`enqueue_raw`](Self::enqueue_raw) copy a
///   prebuilt [`Job`] into the queue. They never allocate and report a full
///   queue as `false`.
/// - [`submit`](Self::submit) boxes a closure and returns a [`TaskHandle`]
///   for its result, retrying while the queue is full.
///
/// Dropping the pool shuts it down; jobs already queued still run.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Start the workers described by `config`.
    ///
    /// Returns once every worker thread is running. Fails with
    /// [`Error::InvalidCapacity`] if `queue_capacity` cannot be rounded up to a
    /// power of two, or [`Error::Spawn`] if a thread does not start.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let worker_count = config.resolved_workers();
        let shared = Arc::new(Shared {
            queue: MpmcQueue::try_new(config.queue_capacity)?,
            stop: Padded::new(AtomicBool::new(false)),
            spin_loops: Padded::new(AtomicU32::new(config.spin_loops)),
            in_flight: Padded::new(AtomicUsize::new(0)),
        });

        let latch = StartupLatch::new(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let name = format!("{}{}", config.thread_name_prefix, id);
            match spawn_worker(id, name, Arc::clone(&shared), latch.arrival()) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    shared.stop.store(true, Ordering::Release);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::Spawn { index: id, source });
                }
            }
        }
        latch.wait();

        debug!(
            workers = worker_count,
            queue_capacity = shared.queue.capacity(),
            spin_loops = config.spin_loops,
            "worker pool started"
        );

        Ok(WorkerPool {
            shared,
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    /// Push a prebuilt job without allocating.
    ///
    /// Returns `false` if the queue is full or the pool is shutting down. The
    /// job has then not been consumed: an owned payload still belongs to the
    /// caller, who may retry or [`discard`](Job::discard) it.
    ///
    /// A job accepted here runs before [`shutdown`](Self::shutdown) returns.
    #[inline]
    pub fn enqueue(&self, job: Job) -> bool {
        let shared = &*self.shared;
        // pairs with the stop CAS in shutdown: either this sees stop, or
        // shutdown sees the count and waits for the push to land
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let accepted =
            !shared.stop.load(Ordering::SeqCst) && shared.queue.enqueue(job).is_ok();
        shared.in_flight.fetch_sub(1, Ordering::Release);
        accepted
    }

    /// Push `entry(payload)` without allocating, with an optional cleanup for
    /// a job-owned payload. Same results as [`enqueue`](Self::enqueue).
    ///
    /// # Safety
    ///
    /// See [`Job::from_raw`].
    #[inline]
    pub unsafe fn enqueue_raw(
        &self,
        entry: JobFn,
        payload: *mut (),
        cleanup: Option<CleanupFn>,
    ) -> bool {
        self.enqueue(unsafe { Job::from_raw(entry, payload, cleanup) })
    }

    /// Run `func` on a worker and get a handle to its result.
    ///
    /// Allocates the task on the heap. While the queue is full this spins for
    /// the configured budget, then keeps retrying with `yield_now`. Fails with
    /// [`Error::ShutDown`] once the pool stops accepting work.
    pub fn submit<F, R>(&self, func: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(Error::ShutDown);
        }

        let (job, handle) = task_handle::package(func);
        if self.enqueue_with_backoff(job) {
            Ok(handle)
        } else {
            job.discard();
            Err(Error::ShutDown)
        }
    }

    /// Box `func` as a fire-and-forget job and try once to queue it.
    ///
    /// Returns `false` (dropping `func`) if the queue is full or the pool is
    /// shutting down.
    pub fn try_execute<F>(&self, func: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        fn call<F: FnOnce()>(payload: *mut ()) {
            // SAFETY: payload is the Box<Option<F>> leaked below
            let slot = unsafe { &mut *(payload as *mut Option<F>) };
            if let Some(func) = slot.take() {
                func();
            }
        }

        fn release<F>(payload: *mut ()) {
            // SAFETY: runs exactly once, as the job's cleanup
            drop(unsafe { Box::from_raw(payload as *mut Option<F>) });
        }

        let payload = Box::into_raw(Box::new(Some(func))) as *mut ();
        // SAFETY: F is Send + 'static and the box is freed only by release
        let job = unsafe { Job::owned(call::<F>, payload, release::<F>) };
        if self.enqueue(job) {
            true
        } else {
            job.discard();
            false
        }
    }

    /// Stop the workers, run everything still queued, and join the threads.
    ///
    /// Every job accepted before or during this call has run by the time the
    /// first call returns. Later or concurrent calls return immediately. Also
    /// runs on drop.
    pub fn shutdown(&self) {
        if self
            .shared
            .stop
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        debug!("worker pool shutting down");

        // after this no push is half done, so the queue holds every accepted job
        self.wait_for_submitters();

        // best effort; workers poll the stop flag anyway
        let rejected = (0..self.worker_count)
            .filter(|_| self.shared.queue.enqueue(Job::wake()).is_err())
            .count();
        if rejected > 0 {
            warn!(rejected, "job queue full, skipped wake jobs");
        }

        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                warn!("shutdown called from a worker thread, not joining it");
                continue;
            }
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }

        // a worker can leave early: skipped here, or its drain ran before the
        // last submitters published
        self.run_leftovers();
        debug!("worker pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Approximate number of jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn spin_loops(&self) -> u32 {
        self.shared.spin_loops.load(Ordering::Relaxed)
    }

    /// Change the spin budget used by workers and by `submit`.
    pub fn set_spin_loops(&self, spin_loops: u32) {
        self.shared.spin_loops.store(spin_loops, Ordering::Relaxed);
    }

    fn enqueue_with_backoff(&self, job: Job) -> bool {
        for _ in 0..self.spin_loops() {
            if self.enqueue(job) {
                return true;
            }
            if self.is_shut_down() {
                return false;
            }
            hint::spin_loop();
        }

        loop {
            if self.enqueue(job) {
                return true;
            }
            if self.is_shut_down() {
                return false;
            }
            thread::yield_now();
        }
    }

    fn wait_for_submitters(&self) {
        let mut spins = 0u32;
        while self.shared.in_flight.load(Ordering::SeqCst) != 0 {
            if spins < self.spin_loops() {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn run_leftovers(&self) {
        while let Some(job) = self.shared.queue.dequeue() {
            worker::execute(CALLER, job);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
