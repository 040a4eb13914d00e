use std::hint;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use tracing::{error, trace};

use crate::job::Job;
use crate::pool::Shared;
use crate::startup_latch::Arrival;

pub fn spawn_worker(
    id: usize,
    name: String,
    shared: Arc<Shared>,
    arrival: Arrival,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name).spawn(move || {
        trace!(worker = id, "worker started");
        drop(arrival);

        run(id, &shared);

        trace!(worker = id, "worker exited");
    })
}

fn run(id: usize, shared: &Shared) {
    let mut spins = 0u32;

    // running / spinning / yielding until the stop flag shows up
    while !shared.stop.load(Ordering::Acquire) {
        if let Some(job) = shared.queue.dequeue() {
            spins = 0;
            execute(id, job);
            continue;
        }

        if spins < shared.spin_loops.load(Ordering::Relaxed) {
            spins += 1;
            hint::spin_loop();
        } else {
            thread::yield_now();
        }
    }

    trace!(worker = id, "draining");
    while let Some(job) = shared.queue.dequeue() {
        execute(id, job);
    }
}

#[inline]
pub(crate) fn execute(id: usize, job: Job) {
    if job.is_wake() {
        return;
    }
    // submitted closures catch their own panics; this only fires for raw jobs
    if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
        error!(worker = id, "job panicked; worker keeps running");
    }
}
