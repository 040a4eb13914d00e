use std::io;

use thiserror::Error;

/// Errors surfaced by the pool types in this crate.
///
/// The zero-allocation paths (`MpmcQueue::enqueue`, `WorkerPool::enqueue`)
/// never produce one of these; they report rejection as a plain value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Every block of a `FixedBlockPool` is live.
    #[error("block pool exhausted: all {capacity} blocks are in use")]
    PoolExhausted { capacity: usize },

    /// A queue capacity has no power of two at or above it in `usize`.
    #[error("capacity {requested} cannot be rounded up to a power of two")]
    InvalidCapacity { requested: usize },

    /// The worker pool stopped accepting work.
    #[error("worker pool is shut down")]
    ShutDown,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Why a `TaskHandle` did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The submitted closure panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was destroyed before it ever ran.
    #[error("task was dropped before it ran")]
    Abandoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
