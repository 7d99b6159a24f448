//! # Task Management System
//!
//! This module provides the fixed-size worker pool that builds chunk meshes off the main thread.
//!
//! ## Architecture Overview
//!
//! The task management system consists of two components:
//! - `WorkerPool`: Owns the worker threads and the processing function they share
//! - `TaskQueue`: The blocking FIFO the threads consume, with a pending count for completion
//!
//! Each worker loops: block until the queue has a task or is closed, take one task, run the
//! processing function on it, mark it complete. When the last pending task completes, every
//! thread blocked in `wait_completion` wakes up.
//!
//! ## Task Lifecycle
//! 1. The pool is created with `WorkerPool::init(thread_count, Some(process_fn))`
//! 2. Work is handed over with `submit`; ownership of the task moves into the queue
//! 3. A worker takes the task and passes it by value to the processing function
//! 4. `wait_completion` blocks the caller until every submitted task has been processed
//! 5. `shutdown` (or dropping the pool) finishes queued work and joins every thread
//!
//! ## Performance Considerations
//! - **Task Granularity**: One task per chunk mesh build, coarse enough to amortize the lock
//! - **Blocking**: Workers sleep on a condition variable while the queue is empty
//! - **Panics**: A panicking task is logged and counted as complete; the worker keeps running
//!
//! ## Example Usage
//! ```rust
//! use std::sync::Arc;
//! use voxel_mesh_pipeline::engine_state::task_management::{task::ProcessFn, WorkerPool};
//!
//! let log_task: ProcessFn<u32> = Arc::new(|n| log::debug!("task {}", n));
//! let pool = WorkerPool::init(2, Some(log_task)).unwrap();
//! for n in 0..8 {
//!     pool.submit(n).unwrap();
//! }
//! pool.wait_completion();
//! assert!(pool.is_idle());
//! ```

pub mod task;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::MAX_WORKER_THREADS;
use crate::error::{PipelineError, Result};
use task::{ProcessFn, TaskQueue};

/// Manages a pool of worker threads applying one processing function to submitted tasks.
///
/// # Implementation Notes
/// - Thread-safe: `submit`, `is_idle` and `wait_completion` can be called from any thread
/// - Drop-safe: Dropping the pool shuts it down and joins every worker
/// - Panic-safe: Task panics are caught and never take a worker down
pub struct WorkerPool<T: Send + 'static> {
    queue: Arc<TaskQueue<T>>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts `thread_count` workers that apply `process_fn` to every submitted task.
    ///
    /// # Arguments
    /// * `thread_count` - Number of worker threads, between 1 and 16
    /// * `process_fn` - Function each task is passed to
    ///
    /// # Errors
    /// - `PipelineError::InvalidThreadCount` for a count outside `[1, 16]`
    /// - `PipelineError::MissingProcessFn` when no function is supplied
    /// - `PipelineError::ThreadSpawn` when the OS refuses a thread; workers already started
    ///   are stopped and joined before the error is returned
    pub fn init(thread_count: usize, process_fn: Option<ProcessFn<T>>) -> Result<Self> {
        if !(1..=MAX_WORKER_THREADS).contains(&thread_count) {
            return Err(PipelineError::InvalidThreadCount(thread_count));
        }
        let process_fn = process_fn.ok_or(PipelineError::MissingProcessFn)?;

        let queue = Arc::new(TaskQueue::new());
        let mut workers = Vec::with_capacity(thread_count);

        for index in 0..thread_count {
            let worker_queue = queue.clone();
            let worker_fn = process_fn.clone();
            let spawned = thread::Builder::new()
                .name(format!("mesh-worker-{}", index))
                .spawn(move || Self::worker_loop(&worker_queue, &worker_fn));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    log::error!("Failed to spawn worker {}: {}", index, e);
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PipelineError::ThreadSpawn(e));
                }
            }
        }

        log::info!(
            "Started {} mesh workers (available parallelism: {:?})",
            thread_count,
            thread::available_parallelism()
        );

        Ok(WorkerPool {
            queue,
            workers,
            thread_count,
        })
    }

    fn worker_loop(queue: &TaskQueue<T>, process_fn: &ProcessFn<T>) {
        while let Some(task) = queue.next() {
            if panic::catch_unwind(AssertUnwindSafe(|| process_fn(task))).is_err() {
                log::error!(
                    "Task panicked on {}",
                    thread::current().name().unwrap_or("worker")
                );
            }
            queue.complete();
        }
    }

    /// Queues a task for the next free worker.
    ///
    /// # Errors
    /// `PipelineError::PoolShutDown` after `shutdown`. The pool itself is unaffected.
    pub fn submit(&self, task: T) -> Result<()> {
        self.queue.push(task)
    }

    /// Whether every submitted task has completed.
    pub fn is_idle(&self) -> bool {
        self.queue.pending() == 0
    }

    /// Number of tasks submitted and not yet completed.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Number of worker threads the pool was started with.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Blocks until every submitted task has completed.
    pub fn wait_completion(&self) {
        self.queue.wait_idle();
    }

    /// Stops accepting tasks, lets the workers finish queued work and joins them.
    ///
    /// Calling this more than once is harmless.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread exited abnormally");
            }
        }
        log::info!("Worker pool shut down");
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Item {
        done: AtomicBool,
    }

    fn flagging_pool(threads: usize) -> WorkerPool<Arc<Item>> {
        let process: ProcessFn<Arc<Item>> = Arc::new(|item: Arc<Item>| {
            item.done.store(true, Ordering::Release);
        });
        WorkerPool::init(threads, Some(process)).unwrap()
    }

    #[test]
    fn test_wait_completion_finishes_all_items() {
        for threads in [1, 3, 16] {
            let pool = flagging_pool(threads);
            let items: Vec<_> = (0..100)
                .map(|_| {
                    Arc::new(Item {
                        done: AtomicBool::new(false),
                    })
                })
                .collect();
            for item in &items {
                pool.submit(item.clone()).unwrap();
            }
            pool.wait_completion();
            assert!(pool.is_idle());
            assert!(items.iter().all(|i| i.done.load(Ordering::Acquire)));
        }
    }

    #[test]
    fn test_wait_with_no_work_returns() {
        let pool = flagging_pool(2);
        pool.wait_completion();
        assert!(pool.is_idle());
        assert_eq!(pool.thread_count(), 2);
    }

    #[test]
    fn test_invalid_init() {
        let process: ProcessFn<u32> = Arc::new(|_| {});
        assert!(matches!(
            WorkerPool::init(0, Some(process.clone())),
            Err(PipelineError::InvalidThreadCount(0))
        ));
        assert!(matches!(
            WorkerPool::init(17, Some(process)),
            Err(PipelineError::InvalidThreadCount(17))
        ));
        assert!(matches!(
            WorkerPool::<u32>::init(4, None),
            Err(PipelineError::MissingProcessFn)
        ));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let mut pool = WorkerPool::init(
            2,
            Some(Arc::new(move |n: usize| {
                seen.fetch_add(n, Ordering::SeqCst);
            }) as ProcessFn<usize>),
        )
        .unwrap();
        pool.submit(5).unwrap();
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(matches!(pool.submit(1), Err(PipelineError::PoolShutDown)));
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_still_completes() {
        let pool = WorkerPool::init(
            1,
            Some(Arc::new(|n: u32| {
                if n == 3 {
                    panic!("bad task");
                }
            }) as ProcessFn<u32>),
        )
        .unwrap();
        for n in 0..6 {
            pool.submit(n).unwrap();
        }
        pool.wait_completion();
        assert!(pool.is_idle());
    }
}
