///
/// Worker pool error types.
///
/// The queue is unbounded, so the only failures are the OS refusing to
/// start a worker thread and work arriving after the pool was shut down.
///

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to spawn worker-{worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("Worker pool has been shut down; task discarded")]
    ShutDown,
}
