use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, Thread};

// lets the pool constructor park until every worker thread is up
pub struct StartupLatch {
    pending: Arc<AtomicUsize>,
}

impl StartupLatch {
    pub fn new(count: usize) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(count)),
        }
    }

    // one per worker; must be created on the thread that later waits
    pub fn arrival(&self) -> Arrival {
        Arrival {
            pending: Arc::clone(&self.pending),
            waiter: thread::current(),
        }
    }

    pub fn wait(&self) {
        while self.pending.load(Ordering::Acquire) != 0 {
            thread::park();
        }
    }
}

// signals on drop so a worker that dies during startup still releases the latch
pub struct Arrival {
    pending: Arc<AtomicUsize>,
    waiter: Thread,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::Release) == 1 {
            self.waiter.unpark();
        }
    }
}
