use std::num::NonZeroUsize;

/// Construction parameters for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads to start; 0 means one per available CPU.
    pub workers: usize,
    /// Job queue capacity, rounded up to a power of two.
    pub queue_capacity: usize,
    /// Empty polls a worker (or a retrying submitter) spins through before it
    /// starts yielding its time slice.
    pub spin_loops: u32,
    /// Worker threads are named `{prefix}{index}`.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 1024,
            spin_loops: 256,
            thread_name_prefix: "spin-pool-".to_owned(),
        }
    }
}

impl PoolConfig {
    /// Long spin phase for latency-critical dispatch, at the cost of busy cores.
    pub fn low_latency() -> Self {
        Self {
            spin_loops: 4096,
            queue_capacity: 4096,
            ..Self::default()
        }
    }

    /// Short spin phase; idle workers yield almost immediately.
    pub fn balanced() -> Self {
        Self {
            spin_loops: 32,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_spin_loops(mut self, spin_loops: u32) -> Self {
        self.spin_loops = spin_loops;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    // the worker count this config actually starts
    pub(crate) fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}
