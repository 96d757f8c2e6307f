//! Dynamic worker pool with an explicit lifecycle state machine.
//!
//! # Lifecycle
//!
//! ```text
//! RUNNING ──pause──▶ PAUSED ──resume──▶ RUNNING
//! RUNNING ──shutdown──▶ SHUTDOWN ──queue drained──▶ TERMINATING ──▶ TERMINATED
//! PAUSED  ──shutdown──▶ (implicit resume) ──▶ SHUTDOWN ──▶ ...
//! ```
//!
//! A RUNNING pool accepts and executes tasks. A PAUSED pool still accepts
//! submissions but its workers block at a pause gate. SHUTDOWN rejects new
//! work and drains the queue; once empty the pool moves to TERMINATING,
//! joins every worker and the monitor, and settles in TERMINATED, which is
//! terminal.
//!
//! # Scaling
//!
//! With dynamic scaling enabled, a monitor thread wakes every
//! `monitor_interval` and applies two mutually exclusive rules per tick:
//! grow by exactly one worker when every worker is busy and work is queued
//! (damps oscillation), or reap the tail workers that have been idle longer
//! than `keep_alive_time`, never below `core_thread_count`. Workers reaped
//! mid-task are parked in a zombie set and joined later, so neither the
//! monitor nor `decrease` ever blocks on a long-running task.
//!
//! # Lock hierarchy
//!
//! Five locks cooperate here; to stay deadlock-free they are always taken in
//! this order, releasing in reverse:
//!
//! ```text
//! pool.status → pool.workers (live or zombie) → pool.queue → worker.status
//! ```
//!
//! A worker holding the queue lock must never take the pool status lock —
//! it consults the atomic `terminating` flag instead. Capacity parameters
//! live in atomics so the monitor and reconfiguration listeners can read
//! and write them without locking.

mod config;
mod task;
mod worker;

pub use config::ThreadPoolConfig;
pub use task::TaskHandle;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config as config_registry;
use task::Task;
use worker::Worker;

/// Lifecycle state of a [`ThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolStatus {
    /// Accepting and executing tasks.
    Running = 0,
    /// Accepting tasks; workers are parked at the pause gate.
    Paused = 1,
    /// Rejecting new tasks; draining the queue.
    Shutdown = 2,
    /// Queue drained; workers and monitor are being joined.
    Terminating = 3,
    /// All resources released. Terminal.
    Terminated = 4,
}

impl PoolStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::Shutdown,
            3 => Self::Terminating,
            4 => Self::Terminated,
            _ => unreachable!("invalid pool status {value}"),
        }
    }

    /// Upper-case textual form of the status.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Shutdown => "SHUTDOWN",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors returned by [`ThreadPool::submit`].
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The pool is past the point of accepting work.
    #[error("cannot submit tasks while the pool is {status}")]
    CannotSubmit {
        /// Status at the time of submission.
        status: PoolStatus,
    },

    /// The bounded task queue is at capacity.
    #[error("task queue is full (capacity {capacity})")]
    QueueFull {
        /// The capacity in force when the submission was rejected.
        capacity: usize,
    },
}

/// Errors returned by [`ThreadPool::increase`] and [`ThreadPool::decrease`].
#[derive(Debug, Error)]
pub enum StateError {
    /// Capacity changes require a RUNNING or PAUSED pool.
    #[error("operation requires a RUNNING or PAUSED pool, status is {status}")]
    BadState {
        /// Status at the time of the call.
        status: PoolStatus,
    },
}

/// Error surfaced by [`TaskHandle::wait`] when the task did not complete
/// normally.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The task panicked; the payload was captured and logged.
    #[error("task panicked: {message}")]
    Panicked {
        /// Rendering of the panic payload.
        message: String,
    },
}

/// Shared pool core. Worker threads and the monitor hold an `Arc` to this.
pub(crate) struct PoolInner {
    status: AtomicU8,
    status_lock: Mutex<()>,

    max_task_count: AtomicUsize,
    pub(crate) queue: Mutex<VecDeque<Task>>,
    pub(crate) task_cv: Condvar,
    pub(crate) queue_empty_cv: Condvar,

    workers: Mutex<Vec<Worker>>,
    zombies: Mutex<Vec<Worker>>,

    /// Read by workers inside the queue lock instead of the pool status.
    pub(crate) terminating: AtomicBool,

    monitor: Mutex<Option<JoinHandle<()>>>,
    monitor_lock: Mutex<()>,
    monitor_cv: Condvar,

    pub(crate) busy_count: AtomicUsize,
    core_thread_count: AtomicUsize,
    max_thread_count: AtomicUsize,
    pub(crate) keep_alive_ms: AtomicU64,
    monitor_interval_ms: AtomicU64,

    dynamic_scaling: bool,
    /// Reference point for worker last-active timestamps.
    epoch: Instant,
}

impl PoolInner {
    fn new(config: &ThreadPoolConfig) -> Self {
        Self {
            status: AtomicU8::new(PoolStatus::Running as u8),
            status_lock: Mutex::new(()),
            max_task_count: AtomicUsize::new(config.max_task_count),
            queue: Mutex::new(VecDeque::new()),
            task_cv: Condvar::new(),
            queue_empty_cv: Condvar::new(),
            workers: Mutex::new(Vec::new()),
            zombies: Mutex::new(Vec::new()),
            terminating: AtomicBool::new(false),
            monitor: Mutex::new(None),
            monitor_lock: Mutex::new(()),
            monitor_cv: Condvar::new(),
            busy_count: AtomicUsize::new(0),
            core_thread_count: AtomicUsize::new(config.core_thread_count),
            max_thread_count: AtomicUsize::new(config.max_thread_count),
            keep_alive_ms: AtomicU64::new(config.keep_alive_time.as_millis() as u64),
            monitor_interval_ms: AtomicU64::new(config.monitor_interval.as_millis() as u64),
            dynamic_scaling: config.enable_dynamic_scaling,
            epoch: Instant::now(),
        }
    }

    fn status(&self) -> PoolStatus {
        PoolStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: PoolStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Milliseconds elapsed since pool construction.
    pub(crate) fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_queue_full(&self) -> bool {
        let max = self.max_task_count.load(Ordering::Acquire);
        if max == 0 {
            return false;
        }
        self.queue.lock().unwrap().len() >= max
    }

    fn submit_task(&self, task: Task) -> Result<(), SubmitError> {
        let _status = self.status_lock.lock().unwrap();
        let status = self.status();

        if status != PoolStatus::Running && status != PoolStatus::Paused {
            tracing::error!(status = status.name(), "submission rejected: pool not accepting tasks");
            return Err(SubmitError::CannotSubmit { status });
        }

        if self.is_queue_full() {
            let capacity = self.max_task_count.load(Ordering::Acquire);
            tracing::error!(capacity, "submission rejected: task queue full");
            return Err(SubmitError::QueueFull { capacity });
        }

        self.queue.lock().unwrap().push_back(task);
        self.task_cv.notify_one();
        Ok(())
    }

    fn pause(&self) {
        let _status = self.status_lock.lock().unwrap();
        if self.status() == PoolStatus::Running {
            self.set_status(PoolStatus::Paused);
            tracing::info!("pool status: RUNNING -> PAUSED");

            {
                let workers = self.workers.lock().unwrap();
                for worker in workers.iter() {
                    worker.state().pause();
                }
            }

            // Wake waiting workers so they observe their new state.
            self.task_cv.notify_all();
        }
    }

    fn resume(&self) {
        let _status = self.status_lock.lock().unwrap();
        self.resume_locked();
    }

    /// Caller must hold the status lock.
    fn resume_locked(&self) {
        if self.status() == PoolStatus::Paused {
            self.set_status(PoolStatus::Running);
            tracing::info!("pool status: PAUSED -> RUNNING");

            {
                let workers = self.workers.lock().unwrap();
                for worker in workers.iter() {
                    worker.state().resume();
                }
            }

            // The queue may have accumulated tasks while paused.
            self.task_cv.notify_all();
        }
    }

    fn shutdown(&self) {
        // Phase 1: enter SHUTDOWN. A paused pool is resumed first so its
        // workers can drain the queue.
        {
            let _status = self.status_lock.lock().unwrap();
            match self.status() {
                PoolStatus::Paused => {
                    self.resume_locked();
                    self.set_status(PoolStatus::Shutdown);
                }
                PoolStatus::Running => self.set_status(PoolStatus::Shutdown),
                _ => return,
            }
            tracing::info!("pool status: RUNNING -> SHUTDOWN");
        }

        // Phase 2: wait for the queue to drain.
        {
            let mut queue = self.queue.lock().unwrap();
            while !queue.is_empty() {
                queue = self.queue_empty_cv.wait(queue).unwrap();
            }
        }

        // Phase 3: terminate. Workers observe the flag, finish, and exit.
        self.set_status(PoolStatus::Terminating);
        self.terminating.store(true, Ordering::Release);
        self.task_cv.notify_all();
        self.monitor_cv.notify_all();
        tracing::info!("pool status: SHUTDOWN -> TERMINATING");

        // Dropping a worker joins its thread.
        self.workers.lock().unwrap().clear();
        self.zombies.lock().unwrap().clear();

        if let Some(monitor) = self.monitor.lock().unwrap().take() {
            let _ = monitor.join();
        }

        self.set_status(PoolStatus::Terminated);
        tracing::info!("pool status: TERMINATING -> TERMINATED");
    }

    /// Caller must hold the status lock.
    fn increase_locked(self: &Arc<Self>, count: usize) -> Result<(), StateError> {
        let status = self.status();
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            tracing::error!(status = status.name(), "cannot grow pool in this state");
            return Err(StateError::BadState { status });
        }

        {
            let mut workers = self.workers.lock().unwrap();
            for _ in 0..count {
                let worker = Worker::spawn(self);
                if status == PoolStatus::Paused {
                    // A paused pool must not dequeue, new workers included.
                    worker.state().pause();
                }
                workers.push(worker);
            }
        }
        tracing::info!(count, "pool grew");
        Ok(())
    }

    /// Caller must hold the status lock.
    fn decrease_locked(&self, count: usize) -> Result<(), StateError> {
        let status = self.status();
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            tracing::error!(status = status.name(), "cannot shrink pool in this state");
            return Err(StateError::BadState { status });
        }

        let mut workers = self.workers.lock().unwrap();
        let mut zombies = self.zombies.lock().unwrap();

        let count = count.min(workers.len());
        if count != 0 {
            // Joining here could block on an in-flight task, so terminated
            // workers are parked in the zombie set and joined at shutdown.
            let split_at = workers.len() - count;
            let tail = workers.split_off(split_at);
            for worker in &tail {
                worker.state().terminate();
            }
            zombies.extend(tail);

            self.task_cv.notify_all();
        }

        tracing::info!(count, "pool shrank");
        Ok(())
    }

    /// One monitor tick: apply the grow rule, else the shrink rule.
    fn adjust(self: &Arc<Self>) {
        let _status = self.status_lock.lock().unwrap();
        let status = self.status();
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            return;
        }

        let live = self.workers.lock().unwrap().len();
        let busy = self.busy_count.load(Ordering::Relaxed);
        let queued = self.queue.lock().unwrap().len();

        // Grow: saturated workers and a backlog. One worker per tick.
        if status == PoolStatus::Running
            && busy == live
            && queued > 0
            && live < self.max_thread_count.load(Ordering::Acquire)
        {
            let _ = self.increase_locked(1);
            return;
        }

        // Shrink: reap tail workers idle past the keep-alive window.
        let core = self.core_thread_count.load(Ordering::Acquire);
        if live > core && busy < live {
            let keep_alive = self.keep_alive_ms.load(Ordering::Acquire);
            let now = self.now_ms();
            let expired = {
                let workers = self.workers.lock().unwrap();
                workers
                    .iter()
                    .rev()
                    .take(live - core)
                    .filter(|worker| {
                        now.saturating_sub(worker.state().last_active_ms()) >= keep_alive
                    })
                    .count()
            };
            if expired > 0 {
                let _ = self.decrease_locked(expired);
            }
        }
    }

    /// Applies a configuration change to the capacity atomics.
    fn apply_config(&self, old: &ThreadPoolConfig, new: &ThreadPoolConfig) {
        tracing::info!("threadpool configuration changed");

        if old.max_task_count != new.max_task_count {
            tracing::info!(
                from = old.max_task_count,
                to = new.max_task_count,
                "max_task_count updated"
            );
            self.max_task_count.store(new.max_task_count, Ordering::Release);
        }

        if old.core_thread_count != new.core_thread_count {
            tracing::info!(
                from = old.core_thread_count,
                to = new.core_thread_count,
                "core_thread_count updated"
            );
            self.core_thread_count
                .store(new.core_thread_count, Ordering::Release);
        }

        if old.max_thread_count != new.max_thread_count {
            tracing::info!(
                from = old.max_thread_count,
                to = new.max_thread_count,
                "max_thread_count updated"
            );
            self.max_thread_count
                .store(new.max_thread_count, Ordering::Release);
        }

        if old.keep_alive_time != new.keep_alive_time {
            tracing::info!(
                from_ms = old.keep_alive_time.as_millis() as u64,
                to_ms = new.keep_alive_time.as_millis() as u64,
                "keep_alive_time updated"
            );
            self.keep_alive_ms
                .store(new.keep_alive_time.as_millis() as u64, Ordering::Release);
        }

        if old.monitor_interval != new.monitor_interval {
            tracing::info!(
                from_ms = old.monitor_interval.as_millis() as u64,
                to_ms = new.monitor_interval.as_millis() as u64,
                "monitor_interval updated"
            );
            self.monitor_interval_ms
                .store(new.monitor_interval.as_millis() as u64, Ordering::Release);
        }
    }
}

/// Periodic grow/shrink evaluation. Runs until the terminating flag is set.
fn monitor_loop(inner: &Arc<PoolInner>) {
    loop {
        if inner.terminating.load(Ordering::Acquire) {
            break;
        }

        {
            let guard = inner.monitor_lock.lock().unwrap();
            let interval =
                Duration::from_millis(inner.monitor_interval_ms.load(Ordering::Acquire));
            let (guard, timeout) = inner
                .monitor_cv
                .wait_timeout_while(guard, interval, |_| {
                    !inner.terminating.load(Ordering::Acquire)
                })
                .unwrap();
            drop(guard);
            if !timeout.timed_out() {
                break;
            }
        }

        tracing::trace!("monitor tick: evaluating pool capacity");
        inner.adjust();
    }

    tracing::debug!("monitor thread terminated");
}

/// A pool of OS worker threads executing submitted tasks in FIFO order.
///
/// See the [module docs](self) for the lifecycle and scaling behavior.
/// Dropping the pool performs a graceful [`shutdown`](Self::shutdown).
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Creates a pool with `core_thread_count` workers in RUNNING state.
    ///
    /// When `enable_dynamic_scaling` is set, the monitor thread is launched
    /// here; it is never started later, even if a configuration reload
    /// changes the capacity limits. The pool also registers the `threadpool`
    /// configuration variable and listens for changes to its capacity
    /// fields.
    #[must_use]
    pub fn new(config: ThreadPoolConfig) -> Self {
        let inner = Arc::new(PoolInner::new(&config));

        if config.enable_dynamic_scaling {
            let monitor = {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name("foreman-monitor".to_string())
                    .spawn(move || monitor_loop(&inner))
                    .expect("failed to spawn monitor thread")
            };
            *inner.monitor.lock().unwrap() = Some(monitor);
            tracing::info!(
                interval_ms = config.monitor_interval.as_millis() as u64,
                "dynamic scaling enabled, monitor active"
            );
        } else {
            tracing::info!("dynamic scaling disabled, monitor inactive");
        }

        {
            let mut workers = inner.workers.lock().unwrap();
            for _ in 0..config.core_thread_count {
                workers.push(Worker::spawn(&inner));
            }
        }

        register_reconfiguration(&inner, config);

        Self { inner }
    }

    /// Submits a closure for execution, returning its completion handle.
    ///
    /// Accepted while the pool is RUNNING or PAUSED; a paused pool queues
    /// the task until resumed. Fails with [`SubmitError::QueueFull`] when a
    /// bounded queue is at capacity.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskHandle<R>, SubmitError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = Task::new(f);
        self.inner.submit_task(task)?;
        Ok(handle)
    }

    /// Pauses a RUNNING pool. Submissions continue to be accepted but
    /// workers stop dequeuing. Idempotent; ignored in other states.
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Resumes a PAUSED pool. Idempotent; ignored in other states.
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Gracefully shuts the pool down.
    ///
    /// Stops accepting tasks, drains every admitted task, joins all workers
    /// (including deferred-terminate zombies) and the monitor thread, and
    /// leaves the pool TERMINATED. A paused pool is resumed first so its
    /// queue can drain. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Spawns `count` additional workers.
    pub fn increase(&self, count: usize) -> Result<(), StateError> {
        let _status = self.inner.status_lock.lock().unwrap();
        self.inner.increase_locked(count)
    }

    /// Signals `count` workers (clipped to the live count) to terminate.
    ///
    /// Only the termination signal is delivered here; the worker threads are
    /// joined later, at shutdown.
    pub fn decrease(&self, count: usize) -> Result<(), StateError> {
        let _status = self.inner.status_lock.lock().unwrap();
        self.inner.decrease_locked(count)
    }

    /// Updates the task queue capacity. Zero disables the bound.
    pub fn set_max_task_count(&self, count: usize) {
        self.inner.max_task_count.store(count, Ordering::Release);
    }

    /// Number of live workers.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.workers.lock().unwrap().len()
    }

    /// Number of workers currently executing a task.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.inner.busy_count.load(Ordering::Relaxed)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let _status = self.inner.status_lock.lock().unwrap();
        self.inner.status()
    }

    /// Snapshot of the capacity parameters currently in force.
    #[must_use]
    pub fn pool_config(&self) -> ThreadPoolConfig {
        ThreadPoolConfig {
            max_task_count: self.inner.max_task_count.load(Ordering::Acquire),
            core_thread_count: self.inner.core_thread_count.load(Ordering::Acquire),
            max_thread_count: self.inner.max_thread_count.load(Ordering::Acquire),
            keep_alive_time: Duration::from_millis(
                self.inner.keep_alive_ms.load(Ordering::Acquire),
            ),
            monitor_interval: Duration::from_millis(
                self.inner.monitor_interval_ms.load(Ordering::Acquire),
            ),
            enable_dynamic_scaling: self.inner.dynamic_scaling,
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("status", &self.inner.status())
            .field("busy", &self.inner.busy_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Publishes the `threadpool` configuration variable and wires its changes
/// into the pool's capacity atomics.
///
/// The listener holds a weak reference: a shut-down and dropped pool simply
/// stops reacting, and the process-global registry does not keep dead pools
/// alive.
fn register_reconfiguration(inner: &Arc<PoolInner>, config: ThreadPoolConfig) {
    match config_registry::get_or_create("threadpool", config, "thread pool capacity settings") {
        Ok(var) => {
            let weak = Arc::downgrade(inner);
            var.add_listener(move |old, new| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_config(old, new);
                }
            });
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                "failed to register threadpool configuration variable"
            );
        }
    }
}
