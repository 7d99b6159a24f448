//! # Task Queue
//!
//! The shared FIFO behind the worker pool.
//!
//! ## Task Lifecycle
//! 1. `push` appends a task and counts it as pending
//! 2. A worker blocked in `next` wakes up and takes it
//! 3. The worker runs the processing function, then calls `complete`
//! 4. When the pending count drops to zero every `wait_idle` caller is released
//!
//! After `close`, `push` fails and `next` keeps handing out whatever is still queued, returning
//! `None` only once the queue is empty. Workers therefore finish submitted work before exiting.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{PipelineError, Result};

/// The function every worker applies to the tasks it takes.
pub type ProcessFn<T> = Arc<dyn Fn(T) + Send + Sync>;

struct QueueState<T> {
    tasks: VecDeque<T>,
    pending: usize,
    closed: bool,
}

/// A blocking multi-producer, multi-consumer task queue with completion tracking.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    work_available: Condvar,
    all_done: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Creates an open, empty queue.
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                pending: 0,
                closed: false,
            }),
            work_available: Condvar::new(),
            all_done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a task and wakes one worker.
    ///
    /// # Errors
    /// `PipelineError::PoolShutDown` once the queue is closed.
    pub fn push(&self, task: T) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(PipelineError::PoolShutDown);
        }
        state.tasks.push_back(task);
        state.pending += 1;
        drop(state);
        self.work_available.notify_one();
        Ok(())
    }

    /// Blocks until a task is available and takes it. Returns `None` once the queue is closed and
    /// drained.
    pub fn next(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            state = self
                .work_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Records that a task taken with `next` has finished.
    pub fn complete(&self) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.all_done.notify_all();
        }
    }

    /// Number of tasks submitted and not yet completed, queued or running.
    pub fn pending(&self) -> usize {
        self.lock().pending
    }

    /// Blocks until every submitted task has completed.
    pub fn wait_idle(&self) {
        let mut state = self.lock();
        while state.pending > 0 {
            state = self
                .all_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuses further tasks and wakes every blocked worker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.work_available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_pending() {
        let queue = TaskQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.next(), Some(1));
        queue.complete();
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.next(), Some(2));
        queue.complete();
        queue.wait_idle();
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_close_drains_then_stops() {
        let queue = TaskQueue::new();
        queue.push("a").unwrap();
        queue.close();
        assert!(matches!(queue.push("b"), Err(PipelineError::PoolShutDown)));
        assert_eq!(queue.next(), Some("a"));
        assert_eq!(queue.next(), None);
    }
}
