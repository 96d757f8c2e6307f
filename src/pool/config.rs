//! Pool capacity configuration and its YAML binding.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{CodecError, ConfigValue};

/// Capacity parameters of a [`ThreadPool`](super::ThreadPool).
///
/// Published to the configuration registry under the key `threadpool`, so a
/// configuration reload can retune a live pool:
///
/// ```yaml
/// threadpool:
///   max_task_count: 1000      # 0 = unbounded
///   core_thread_count: 6
///   max_thread_count: 12
///   keep_alive_time: 6000     # milliseconds
///   monitor_interval: 300     # milliseconds
/// ```
///
/// Missing keys fall back to their defaults. `enable_dynamic_scaling` is not
/// part of the YAML form: the monitor thread is launched only when the flag
/// is set at construction, never retroactively.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Task queue capacity; 0 means unbounded.
    pub max_task_count: usize,
    /// Workers kept alive regardless of load.
    pub core_thread_count: usize,
    /// Upper bound for dynamic growth.
    pub max_thread_count: usize,
    /// Idle time after which a non-core worker becomes a shrink candidate.
    pub keep_alive_time: Duration,
    /// Period of the monitor's grow/shrink evaluation.
    pub monitor_interval: Duration,
    /// Whether to launch the scaling monitor at construction.
    pub enable_dynamic_scaling: bool,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            max_task_count: 0,
            core_thread_count: 1,
            max_thread_count: 8,
            keep_alive_time: Duration::from_millis(5000),
            monitor_interval: Duration::from_millis(200),
            enable_dynamic_scaling: true,
        }
    }
}

// Scaling enablement is fixed at construction and excluded from change
// detection, so a reload differing only in that flag is a no-op.
impl PartialEq for ThreadPoolConfig {
    fn eq(&self, other: &Self) -> bool {
        self.max_task_count == other.max_task_count
            && self.core_thread_count == other.core_thread_count
            && self.max_thread_count == other.max_thread_count
            && self.keep_alive_time == other.keep_alive_time
            && self.monitor_interval == other.monitor_interval
    }
}

/// Wire form: durations as integer milliseconds, scaling flag omitted.
#[derive(Serialize, Deserialize)]
#[serde(default)]
struct ThreadPoolConfigRepr {
    max_task_count: usize,
    core_thread_count: usize,
    max_thread_count: usize,
    keep_alive_time: u64,
    monitor_interval: u64,
}

impl Default for ThreadPoolConfigRepr {
    fn default() -> Self {
        Self::from(&ThreadPoolConfig::default())
    }
}

impl From<&ThreadPoolConfig> for ThreadPoolConfigRepr {
    fn from(config: &ThreadPoolConfig) -> Self {
        Self {
            max_task_count: config.max_task_count,
            core_thread_count: config.core_thread_count,
            max_thread_count: config.max_thread_count,
            keep_alive_time: config.keep_alive_time.as_millis() as u64,
            monitor_interval: config.monitor_interval.as_millis() as u64,
        }
    }
}

impl From<ThreadPoolConfigRepr> for ThreadPoolConfig {
    fn from(repr: ThreadPoolConfigRepr) -> Self {
        Self {
            max_task_count: repr.max_task_count,
            core_thread_count: repr.core_thread_count,
            max_thread_count: repr.max_thread_count,
            keep_alive_time: Duration::from_millis(repr.keep_alive_time),
            monitor_interval: Duration::from_millis(repr.monitor_interval),
            enable_dynamic_scaling: ThreadPoolConfig::default().enable_dynamic_scaling,
        }
    }
}

impl ConfigValue for ThreadPoolConfig {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        let repr: ThreadPoolConfigRepr = serde_yaml::from_str(text)?;
        Ok(repr.into())
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        Ok(serde_yaml::to_string(&ThreadPoolConfigRepr::from(self))?
            .trim_end()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ThreadPoolConfig::default();
        assert_eq!(config.max_task_count, 0);
        assert_eq!(config.core_thread_count, 1);
        assert_eq!(config.max_thread_count, 8);
        assert_eq!(config.keep_alive_time, Duration::from_millis(5000));
        assert_eq!(config.monitor_interval, Duration::from_millis(200));
        assert!(config.enable_dynamic_scaling);
    }

    #[test]
    fn codec_round_trip() {
        let config = ThreadPoolConfig {
            max_task_count: 1000,
            core_thread_count: 6,
            max_thread_count: 12,
            keep_alive_time: Duration::from_millis(6000),
            monitor_interval: Duration::from_millis(300),
            enable_dynamic_scaling: true,
        };
        let text = config.to_yaml_string().unwrap();
        assert_eq!(ThreadPoolConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn missing_keys_use_defaults() {
        let config =
            ThreadPoolConfig::from_yaml_str("core_thread_count: 4\nmax_thread_count: 16\n")
                .unwrap();
        assert_eq!(config.core_thread_count, 4);
        assert_eq!(config.max_thread_count, 16);
        assert_eq!(config.max_task_count, 0);
        assert_eq!(config.keep_alive_time, Duration::from_millis(5000));
        assert_eq!(config.monitor_interval, Duration::from_millis(200));
    }

    #[test]
    fn equality_ignores_scaling_flag() {
        let a = ThreadPoolConfig::default();
        let b = ThreadPoolConfig {
            enable_dynamic_scaling: false,
            ..ThreadPoolConfig::default()
        };
        assert_eq!(a, b);

        let c = ThreadPoolConfig {
            core_thread_count: 2,
            ..ThreadPoolConfig::default()
        };
        assert_ne!(a, c);
    }
}
