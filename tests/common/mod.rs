#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::sync::{Arc, Condvar, Mutex, Once};

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing output for tests. Safe to call repeatedly; the first
/// call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// A reusable blocker: tasks park on [`Gate::wait`] until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling task until the gate opens.
    pub fn wait(&self) {
        let mut open = self.inner.open.lock().unwrap();
        while !*open {
            open = self.inner.cv.wait(open).unwrap();
        }
    }

    /// Opens the gate, releasing every current and future waiter.
    pub fn open(&self) {
        let mut open = self.inner.open.lock().unwrap();
        *open = true;
        self.inner.cv.notify_all();
    }
}
