//! Tasks and completion handles.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use super::JoinError;

/// A queued unit of work: the user closure wrapped into a nullary executor
/// that routes its result (or panic) into the completion handle.
pub(crate) struct Task {
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Wraps a closure, returning the queue-side task and the caller-side
    /// completion handle.
    pub(crate) fn new<F, R>(f: F) -> (Self, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let slot = Arc::new(Slot::new());
        let completion = Arc::clone(&slot);
        let run = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            if let Err(payload) = &result {
                tracing::error!(
                    panic = %panic_message(&**payload),
                    "task panicked during execution"
                );
            }
            completion.complete(result);
        };
        (
            Self { run: Box::new(run) },
            TaskHandle { slot },
        )
    }

    /// Executes the task. Panics are already contained by the wrapper.
    pub(crate) fn run(self) {
        (self.run)();
    }
}

/// Completion slot shared between a task and its handle.
struct Slot<R> {
    done: AtomicBool,
    result: Mutex<Option<thread::Result<R>>>,
    cv: Condvar,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn complete(&self, result: thread::Result<R>) {
        let mut slot = self.result.lock().unwrap();
        *slot = Some(result);
        self.done.store(true, Ordering::Release);
        self.cv.notify_all();
    }
}

/// Handle by which a submitter awaits a task's result.
///
/// The handle resolves once the task has run to completion; a panicking task
/// resolves to [`JoinError::Panicked`] instead of poisoning the worker.
pub struct TaskHandle<R> {
    slot: Arc<Slot<R>>,
}

impl<R> TaskHandle<R> {
    /// Returns `true` once the task has finished (successfully or not).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.done.load(Ordering::Acquire)
    }

    /// Blocks until the task completes and returns its result.
    pub fn wait(self) -> Result<R, JoinError> {
        let mut slot = self.slot.result.lock().unwrap();
        while slot.is_none() {
            slot = self.slot.cv.wait(slot).unwrap();
        }
        match slot.take().expect("result present after wait") {
            Ok(value) => Ok(value),
            Err(payload) => Err(JoinError::Panicked {
                message: panic_message(&*payload),
            }),
        }
    }

    /// Waits for the task to complete, up to `timeout`.
    ///
    /// Returns `true` if the task finished within the window. The result
    /// stays in the handle; collect it with [`wait`](Self::wait).
    #[must_use]
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        if self.is_finished() {
            return true;
        }
        let deadline = std::time::Instant::now() + timeout;
        let mut slot = self.slot.result.lock().unwrap();
        while slot.is_none() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self.slot.cv.wait_timeout(slot, remaining).unwrap();
            slot = guard;
        }
        true
    }
}

impl<R> std::fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Best-effort rendering of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
