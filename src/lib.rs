// Spin-Pool: low-latency job dispatch on lock-free bounded queues
//
// - MpmcQueue: bounded multi-producer/multi-consumer queue with per-slot
//   sequence numbers, no locks anywhere on the push/pop path
// - ring_buffer: bounded single-producer/single-consumer queue, split into a
//   Producer and a Consumer so the one-writer rule can't be broken
// - FixedBlockPool: fixed-capacity typed block allocator for job payloads
// - WorkerPool: spinning worker threads fed from an MpmcQueue of Jobs, with a
//   zero-allocation enqueue path and a boxed submit path with TaskHandles
//
// Safety
// The zero-allocation path passes raw payload pointers. You must ensure:
// - borrowed payloads outlive the job that points at them
// - payloads are safe to touch from a worker thread
// - an owned payload is freed only by the job's cleanup function
mod block_pool;
mod config;
mod error;
mod job;
mod macros;
mod mpmc_queue;
mod padded_type;
mod pool;
mod ring_buffer;
mod startup_latch;
mod task_handle;
mod worker;

pub use block_pool::FixedBlockPool;
pub use config::PoolConfig;
pub use error::{Error, Result, TaskError};
pub use job::{CleanupFn, Job, JobFn, Payload};
pub use mpmc_queue::MpmcQueue;
pub use pool::WorkerPool;
pub use ring_buffer::{Consumer, Producer, ring_buffer};
pub use task_handle::TaskHandle;

// convenience function to start a pool with one worker per cpu
pub fn new() -> Result<WorkerPool> {
    WorkerPool::new(PoolConfig::default())
}

// start a pool with a specific worker count and default tuning
pub fn with_workers(worker_count: usize) -> Result<WorkerPool> {
    WorkerPool::new(PoolConfig::default().with_workers(worker_count))
}
