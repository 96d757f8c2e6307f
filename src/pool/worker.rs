//! Worker threads and their private state machine.
//!
//! Each worker cycles through a small lifecycle of its own:
//!
//! ```text
//! RUNNING ⇄ PAUSED
//!    │         │
//!    ▼         ▼ (pause gate released on terminate)
//! TERMINATING ──▶ TERMINATED
//! ```
//!
//! A worker marked TERMINATING may still be inside a task; its thread join
//! is deferred by moving it to the pool's zombie set (see
//! [`ThreadPool::decrease`](super::ThreadPool::decrease)).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use super::{PoolInner, Task};

/// Lifecycle state of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum WorkerStatus {
    /// Executing or waiting for tasks.
    Running = 0,
    /// Blocked at the pause gate; does not dequeue.
    Paused = 1,
    /// Signalled to exit; will finish an in-flight task first.
    Terminating = 2,
    /// Loop exited; the thread is joinable without blocking.
    Terminated = 3,
}

impl WorkerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::Terminating,
            3 => Self::Terminated,
            _ => unreachable!("invalid worker status {value}"),
        }
    }
}

/// Manual binary semaphore gating paused workers.
pub(crate) struct BinarySemaphore {
    available: Mutex<bool>,
    cv: Condvar,
}

impl BinarySemaphore {
    pub(crate) fn new(initially_available: bool) -> Self {
        Self {
            available: Mutex::new(initially_available),
            cv: Condvar::new(),
        }
    }

    /// Blocks until the semaphore is released, consuming it.
    pub(crate) fn acquire(&self) {
        let mut available = self.available.lock().unwrap();
        while !*available {
            available = self.cv.wait(available).unwrap();
        }
        *available = false;
    }

    /// Makes the semaphore available, waking one waiter.
    pub(crate) fn release(&self) {
        let mut available = self.available.lock().unwrap();
        if !*available {
            *available = true;
            self.cv.notify_one();
        }
    }
}

/// State shared between a worker's thread and the pool.
pub(crate) struct WorkerState {
    /// Current status. Reads may be lock-free; transitions hold `status_lock`.
    status: AtomicU8,
    status_lock: RwLock<()>,
    pause_gate: BinarySemaphore,
    /// Completion time of the last task, in milliseconds since the pool
    /// epoch. Seeded to `now - keep_alive` so a freshly spawned worker that
    /// finds no work is reap-eligible on the next monitor tick.
    last_active_ms: AtomicU64,
}

impl WorkerState {
    pub(crate) fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Signals this worker to exit. A paused worker has its gate released so
    /// it can observe the new status.
    pub(crate) fn terminate(&self) {
        let _guard = self.status_lock.write().unwrap();
        match self.status() {
            WorkerStatus::Running => self.set_status(WorkerStatus::Terminating),
            WorkerStatus::Paused => {
                self.set_status(WorkerStatus::Terminating);
                self.pause_gate.release();
            }
            WorkerStatus::Terminating | WorkerStatus::Terminated => {}
        }
    }

    pub(crate) fn pause(&self) {
        let _guard = self.status_lock.write().unwrap();
        if self.status() == WorkerStatus::Running {
            self.set_status(WorkerStatus::Paused);
        }
    }

    pub(crate) fn resume(&self) {
        let _guard = self.status_lock.write().unwrap();
        if self.status() == WorkerStatus::Paused {
            self.set_status(WorkerStatus::Running);
            self.pause_gate.release();
        }
    }

    pub(crate) fn last_active_ms(&self) -> u64 {
        self.last_active_ms.load(Ordering::Acquire)
    }
}

/// A live worker: its shared state plus the owning thread handle.
///
/// Dropping a worker joins its thread, waiting for any in-flight task.
pub(crate) struct Worker {
    state: Arc<WorkerState>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a new worker thread serving `inner`'s queue.
    pub(crate) fn spawn(inner: &Arc<PoolInner>) -> Self {
        let keep_alive = inner.keep_alive_ms.load(Ordering::Acquire);
        let state = Arc::new(WorkerState {
            status: AtomicU8::new(WorkerStatus::Running as u8),
            status_lock: RwLock::new(()),
            pause_gate: BinarySemaphore::new(false),
            last_active_ms: AtomicU64::new(inner.now_ms().saturating_sub(keep_alive)),
        });

        let thread = {
            let inner = Arc::clone(inner);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("foreman-worker".to_string())
                .spawn(move || run(&inner, &state))
                .expect("failed to spawn worker thread")
        };

        tracing::debug!("worker thread started");
        Self {
            state,
            thread: Some(thread),
        }
    }

    pub(crate) fn state(&self) -> &WorkerState {
        &self.state
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Wake predicate for the task condition: the worker leaves the wait when it
/// is no longer RUNNING, the pool is terminating, or work is available.
///
/// The pool's terminating flag is read atomically here on purpose: taking
/// the pool status lock while holding the queue lock would invert the lock
/// hierarchy.
fn should_wake(inner: &PoolInner, state: &WorkerState, queue: &VecDeque<Task>) -> bool {
    let _status = state.status_lock.read().unwrap();
    state.status() != WorkerStatus::Running
        || !queue.is_empty()
        || inner.terminating.load(Ordering::Acquire)
}

/// The worker loop. See the module docs for the lifecycle.
fn run(inner: &Arc<PoolInner>, state: &Arc<WorkerState>) {
    loop {
        // Phase 1: act on our own state.
        {
            let guard = state.status_lock.write().unwrap();
            match state.status() {
                WorkerStatus::Terminating => {
                    state.set_status(WorkerStatus::Terminated);
                    break;
                }
                WorkerStatus::Paused => {
                    drop(guard);
                    state.pause_gate.acquire();
                    continue;
                }
                WorkerStatus::Running | WorkerStatus::Terminated => {}
            }
        }

        // Phase 2: take a task.
        let task = {
            let mut queue = inner.queue.lock().unwrap();
            while !should_wake(inner, state, &queue) {
                queue = inner.task_cv.wait(queue).unwrap();
            }

            // Woken for a state change rather than work?
            {
                let _status = state.status_lock.read().unwrap();
                if state.status() != WorkerStatus::Running {
                    continue;
                }
            }

            // Pool draining finished: flag ourselves for exit.
            if inner.terminating.load(Ordering::Acquire) && queue.is_empty() {
                let _status = state.status_lock.write().unwrap();
                state.set_status(WorkerStatus::Terminating);
                continue;
            }

            let Some(task) = queue.pop_front() else {
                continue;
            };
            if queue.is_empty() {
                inner.queue_empty_cv.notify_all();
            }
            task
        };

        // Phase 3: execute with no locks held.
        inner.busy_count.fetch_add(1, Ordering::Relaxed);
        task.run();
        inner.busy_count.fetch_sub(1, Ordering::Relaxed);
        state.last_active_ms.store(inner.now_ms(), Ordering::Release);
    }

    tracing::debug!("worker thread terminated");
}
