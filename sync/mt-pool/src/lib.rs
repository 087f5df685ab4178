//!
//! mt-pool - Fixed-Size Worker Pool
//!
//! A pool owns a fixed set of worker threads and one shared, unbounded FIFO
//! task queue. Workers block while the queue is empty, take the head task,
//! run it to completion and loop.
//!
//! ## Contract
//!
//! - `WorkerPool::new(size)` - Spawn `size` workers named `worker-<i>`
//! - `pool.submit(task)` - Append a task and wake every idle worker
//! - `pool.run_queue_length()` - Point-in-time count of queued tasks
//! - `pool.shutdown()` - Stop the workers and discard queued tasks
//!
//! A task that panics is reported and counted; the worker that ran it keeps
//! consuming the queue.
//!

pub mod errors;
pub mod pool;

pub use errors::PoolError;
pub use pool::*;
