//! Typed, hot-reloadable configuration registry.
//!
//! Configuration lives in a single process-wide table mapping dotted keys
//! (`workers.io.thread_num`) to strongly-typed variables. Code declares the
//! variables it cares about with [`get_or_create`], holding on to the
//! returned handle; YAML files on disk are bound to those variables by
//! [`load_from_conf_dir`], which flattens each document into dotted keys and
//! updates every registered match.
//!
//! ```text
//!  conf/*.yml ──▶ directory scan ──▶ YAML parse ──▶ tree flattener
//!                                                        │
//!                    listener callbacks ◀── set_value ◀── registry lookup
//! ```
//!
//! Unknown keys are logged and skipped, never created implicitly, so a typo
//! in a configuration file cannot silently materialize a new variable.
//!
//! # Concurrency
//!
//! The registry is single-writer / read-dominated: variables are created
//! during startup and reloads happen at explicit points. Handles are
//! internally synchronized, so concurrent reads of independent variables are
//! safe once creation has quiesced. [`ConfigVar::set_value`] dispatches
//! listeners inline on the calling thread; concurrent `set_value` on the
//! same variable serializes on the value lock but may interleave listener
//! callbacks.

mod codec;
mod registry;
mod var;

pub use codec::{CodecError, ConfigValue};
pub use registry::{
    clear_all, get, get_base, get_or_create, load_from_conf_dir, load_from_yaml,
};
pub use var::{ConfigVar, Listener, VarBase};

use thiserror::Error;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested key contains characters outside `[0-9a-z_.]` or is empty.
    #[error("invalid configuration name: {name:?}")]
    InvalidName {
        /// The rejected key.
        name: String,
    },

    /// The key exists but was declared with a different value type.
    #[error("configuration name {name:?} is bound to type {actual}, not {expected}")]
    TypeMismatch {
        /// The requested key.
        name: String,
        /// The type the caller asked for.
        expected: &'static str,
        /// The type the variable was declared with.
        actual: &'static str,
    },
}
