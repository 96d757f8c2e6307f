//! Foreman: a dynamic worker pool wired to a typed, hot-reloadable
//! configuration registry.
//!
//! # Overview
//!
//! Foreman bundles the two pieces of process plumbing that almost every
//! long-running service grows eventually: a pool of OS threads executing
//! deferred computations under an explicit lifecycle state machine, and a
//! process-wide table of typed configuration variables that can be refreshed
//! from YAML files on disk without restarting.
//!
//! The two halves are wired together: every [`pool::ThreadPool`] registers a
//! `threadpool` configuration variable at construction and listens for
//! changes, so reloading the configuration directory retunes queue capacity,
//! core/max thread counts, keep-alive and monitor intervals of a live pool.
//!
//! # Core Guarantees
//!
//! - **Strict FIFO dispatch**: tasks execute in submission order
//! - **Graceful shutdown**: every admitted task runs to completion before the
//!   pool terminates; shutting down a paused pool resumes it first so the
//!   queue always drains
//! - **Elastic capacity**: an optional monitor thread grows the pool one
//!   worker at a time under backlog and reaps workers idle past the
//!   keep-alive window, never dipping below the core count
//! - **Typed configuration**: a variable's declared type is fixed for the
//!   process lifetime; mismatched lookups fail, they never panic
//! - **Inline change notification**: listeners run on the mutating thread in
//!   ascending registration order, with stable never-reused identifiers
//!
//! # Module Structure
//!
//! - [`pool`]: worker pool, lifecycle state machine, scaling monitor
//! - [`config`]: configuration variables, registry, YAML codecs, hot reload
//! - [`util`]: project-root resolution, directory scanning, name validation
//!
//! # Example
//!
//! ```ignore
//! use foreman::config;
//! use foreman::pool::{ThreadPool, ThreadPoolConfig};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::default());
//! let handle = pool.submit(|| 2 + 2)?;
//! assert_eq!(handle.wait()?, 4);
//!
//! // Retune the pool by reloading configuration from disk.
//! config::load_from_conf_dir("conf", false);
//! pool.shutdown();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod pool;
pub mod util;

pub use config::{CodecError, ConfigError, ConfigValue, ConfigVar};
pub use pool::{
    JoinError, PoolStatus, StateError, SubmitError, TaskHandle, ThreadPool, ThreadPoolConfig,
};
