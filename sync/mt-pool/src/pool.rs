//!
//! Worker Pool
//!
//! A fixed number of OS threads share one unbounded FIFO queue guarded by a
//! mutex and a condition variable. Submitting broadcasts to every idle
//! worker; each worker re-checks the queue after waking, so a spurious or
//! stolen wakeup just sends it back to sleep.
//!
//! Shutdown is cooperative: the termination flag is written under the queue
//! lock together with draining the queue, so no task that was still queued
//! at that point ever runs. Tasks already dequeued run to completion.
//!

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::errors::PoolError;

/// A unit of work: no arguments, no result, consumed exactly once
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The shared task queue
struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        // Tasks never run under this lock, so a poisoned guard still holds a
        // consistent queue.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands the task back if the queue is already closed.
    fn push(&self, task: Task) -> Result<(), Task> {
        let mut tasks = self.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return Err(task);
        }
        tasks.push_back(task);
        self.condvar.notify_all();
        Ok(())
    }

    /// Blocks until a task is available or the queue is closed.
    fn pop(&self) -> Option<Task> {
        let mut tasks = self.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }
            tasks = self
                .condvar
                .wait(tasks)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and returns whatever was still pending. The caller
    /// drops the returned tasks after the lock is released.
    fn close(&self) -> VecDeque<Task> {
        let mut tasks = self.lock();
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return VecDeque::new();
        }
        let pending = std::mem::take(&mut *tasks);
        self.condvar.notify_all();
        pending
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// State shared between the pool handle and its workers
struct Shared {
    queue: TaskQueue,
    active: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Monotonic execution counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Tasks that returned normally
    pub completed: u64,
    /// Tasks that panicked; these are not counted as completed
    pub panicked: u64,
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Worker {
    fn spawn(id: usize, shared: Arc<Shared>) -> Result<Self, PoolError> {
        let thread = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || worker_loop(id, &shared))
            .map_err(|source| PoolError::Spawn { worker: id, source })?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }
}

fn worker_loop(id: usize, shared: &Shared) {
    debug!(worker = id, "worker started");

    while let Some(task) = shared.queue.pop() {
        shared.active.fetch_add(1, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        shared.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(payload) => {
                shared.panicked.fetch_add(1, Ordering::SeqCst);
                error!(
                    worker = id,
                    reason = panic_message(payload.as_ref()),
                    "task panicked, worker continues"
                );
            }
        }
    }

    debug!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Fixed-size pool of worker threads sharing one FIFO queue
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("queued", &self.run_queue_length())
            .field("active_tasks", &self.active_tasks())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `pool_size` workers, each immediately waiting for work.
    ///
    /// No upper bound is enforced. A pool of size zero accepts tasks but
    /// never runs them.
    pub fn new(pool_size: usize) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            queue: TaskQueue::new(),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        // If a spawn fails part way, dropping `pool` stops the workers that
        // did start.
        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(pool_size),
        };
        for id in 0..pool_size {
            let worker = Worker::spawn(id, Arc::clone(&pool.shared))?;
            pool.workers.push(worker);
        }

        debug!(workers = pool_size, "worker pool started");
        Ok(pool)
    }

    /// Create with one worker per available CPU
    pub fn with_default_size() -> Result<Self, PoolError> {
        let count = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(count)
    }

    /// Queue a task. Never blocks; only fails once the pool is shut down.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.shared.queue.push(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(_discarded) => {
                warn!("task submitted after shutdown was discarded");
                Err(PoolError::ShutDown)
            }
        }
    }

    /// Number of tasks not yet dequeued. Racy by nature.
    pub fn run_queue_length(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks currently executing
    pub fn active_tasks(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.shared.completed.load(Ordering::SeqCst),
            panicked: self.shared.panicked.load(Ordering::SeqCst),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Stop the pool without waiting.
    ///
    /// Queued tasks are discarded; tasks already taken by a worker finish.
    /// Idle workers wake up and exit. Repeated calls do nothing.
    pub fn shutdown(&self) {
        let discarded = self.shared.queue.close();
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "shutdown discarded queued tasks");
        }
        drop(discarded);
    }

    /// Shut down, wait for every worker thread to exit and return the
    /// final counters
    pub fn join(mut self) -> PoolStats {
        self.shutdown();
        self.join_workers();
        self.stats()
    }

    fn join_workers(&mut self) {
        let current = thread::current().id();
        for worker in &mut self.workers {
            let Some(handle) = worker.thread.take() else {
                continue;
            };
            // Dropping the pool from inside one of its own tasks must not
            // self-join; that worker exits on its own once the task returns.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(worker = worker.id, "worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        self.join_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Occupies a worker until the returned sender fires. Returns once the
    /// task is running.
    fn block_worker(pool: &WorkerPool) -> mpsc::Sender<()> {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();
        release_tx
    }

    #[test]
    fn test_submit_runs_every_task_once() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            let done_tx = done_tx.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            })
            .unwrap();
        }

        for _ in 0..100 {
            done_rx.recv_timeout(WAIT).unwrap();
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_run_queue_length_counts_pending() {
        let pool = WorkerPool::new(1).unwrap();
        assert_eq!(pool.run_queue_length(), 0);

        let release = block_worker(&pool);
        for _ in 0..3 {
            pool.submit(|| {}).unwrap();
        }
        assert_eq!(pool.run_queue_length(), 3);
        assert_eq!(pool.active_tasks(), 1);

        release.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_tasks_run_in_fifo_order_on_single_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let release = block_worker(&pool);
        let (order_tx, order_rx) = mpsc::channel();

        for i in 0..5 {
            let order_tx = order_tx.clone();
            pool.submit(move || order_tx.send(i).unwrap()).unwrap();
        }
        release.send(()).unwrap();

        let seen: Vec<i32> = (0..5).map(|_| order_rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shutdown_discards_queued_tasks() {
        let pool = WorkerPool::new(1).unwrap();
        let release = block_worker(&pool);
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert!(pool.is_shut_down());
        assert_eq!(pool.run_queue_length(), 0);

        // The in-flight task is allowed to finish.
        release.send(()).unwrap();
        let stats = pool.join();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(2).unwrap();
        pool.shutdown();
        pool.shutdown();

        let err = pool.submit(|| {}).unwrap_err();
        assert!(matches!(err, PoolError::ShutDown));
        assert_eq!(pool.run_queue_length(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_shrink_pool() {
        let pool = WorkerPool::new(1).unwrap();
        let (done_tx, done_rx) = mpsc::channel();

        pool.submit(|| panic!("boom")).unwrap();
        pool.submit(move || done_tx.send(()).unwrap()).unwrap();

        done_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(pool.worker_count(), 1);
        let stats = pool.join();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_zero_sized_pool_never_runs_tasks() {
        let pool = WorkerPool::new(0).unwrap();
        pool.submit(|| panic!("must not run")).unwrap();
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(pool.run_queue_length(), 1);
        pool.join();
    }

    #[test]
    fn test_default_size_matches_parallelism() {
        let pool = WorkerPool::with_default_size().unwrap();
        let expected = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        assert_eq!(pool.worker_count(), expected);
        assert_eq!(pool.join(), PoolStats::default());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_drop_from_inside_a_task_does_not_hang() {
        let pool = WorkerPool::new(2).unwrap();
        let holder = Arc::new(Mutex::new(None::<WorkerPool>));
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        let inner = Arc::clone(&holder);
        pool.submit(move || {
            go_rx.recv().unwrap();
            let taken = inner.lock().unwrap().take();
            assert!(taken.is_some());
            drop(taken);
            done_tx.send(()).unwrap();
        })
        .unwrap();
        *holder.lock().unwrap() = Some(pool);
        go_tx.send(()).unwrap();

        done_rx.recv_timeout(WAIT).unwrap();
    }
}
