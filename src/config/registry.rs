//! Process-wide registry of configuration variables and YAML binding.

use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use super::codec::{key_text, node_text, ConfigValue};
use super::var::{ConfigVar, VarBase};
use super::ConfigError;
use crate::util;

type VarMap = HashMap<String, Arc<dyn VarBase>>;

fn registry() -> &'static RwLock<VarMap> {
    static REGISTRY: OnceLock<RwLock<VarMap>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Per-file modification timestamps from previous loads, used to skip
/// unchanged files on non-forced reloads. Timestamps are compared only for
/// equality.
fn mtime_cache() -> &'static Mutex<HashMap<PathBuf, u64>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, u64>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the variable registered under `name`, creating it if absent.
///
/// If `name` already exists with the requested type, the existing handle is
/// returned and `default_value` / `description` are ignored. If it exists
/// with a different type, the registry is left untouched and
/// [`ConfigError::TypeMismatch`] is returned. Creating a variable with an
/// invalid key fails with [`ConfigError::InvalidName`].
pub fn get_or_create<T>(
    name: &str,
    default_value: T,
    description: &str,
) -> Result<Arc<ConfigVar<T>>, ConfigError>
where
    T: ConfigValue + Clone + PartialEq + Send + Sync + 'static,
{
    let mut map = registry().write().unwrap();

    if let Some(existing) = map.get(name) {
        let actual = existing.type_name();
        return match Arc::clone(existing).as_any_arc().downcast::<ConfigVar<T>>() {
            Ok(var) => {
                tracing::info!(name, value_type = actual, "configuration variable exists");
                Ok(var)
            }
            Err(_) => {
                tracing::error!(
                    name,
                    expected = std::any::type_name::<T>(),
                    actual,
                    "configuration variable exists with a different type"
                );
                Err(ConfigError::TypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<T>(),
                    actual,
                })
            }
        };
    }

    if !util::is_valid_name(name) {
        tracing::error!(name, "invalid configuration name");
        return Err(ConfigError::InvalidName {
            name: name.to_string(),
        });
    }

    let var = Arc::new(ConfigVar::new(name, default_value, description));
    map.insert(name.to_string(), Arc::clone(&var) as Arc<dyn VarBase>);
    Ok(var)
}

/// Returns the variable registered under `name` with the requested type.
///
/// Never creates; `None` on absence or type mismatch.
#[must_use]
pub fn get<T>(name: &str) -> Option<Arc<ConfigVar<T>>>
where
    T: ConfigValue + Clone + PartialEq + Send + Sync + 'static,
{
    let map = registry().read().unwrap();
    let existing = map.get(name)?;
    Arc::clone(existing)
        .as_any_arc()
        .downcast::<ConfigVar<T>>()
        .ok()
}

/// Returns the type-erased variable registered under `name`.
#[must_use]
pub fn get_base(name: &str) -> Option<Arc<dyn VarBase>> {
    registry().read().unwrap().get(name).map(Arc::clone)
}

/// Drops every registered variable.
pub fn clear_all() {
    registry().write().unwrap().clear();
}

/// Flattens a YAML tree into `(dotted_key, node)` pairs.
///
/// Both leaf scalars and intermediate map nodes are emitted, so consumers
/// can bind either a whole subtree or an inner scalar. Sequences are emitted
/// whole at their parent key and not descended. Invalid keys abandon their
/// subtree with an error log.
fn flatten<'a>(prefix: &str, node: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    if !prefix.is_empty() {
        if !util::is_valid_name(prefix) {
            tracing::error!(key = prefix, "invalid configuration key, subtree ignored");
            return;
        }
        out.push((prefix.to_string(), node));
    }

    if let Value::Mapping(map) = node {
        for (key, child) in map {
            let Some(key) = key_text(key) else {
                tracing::error!(parent = prefix, "non-scalar mapping key, entry ignored");
                continue;
            };
            let child_prefix = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };
            flatten(&child_prefix, child, out);
        }
    }
}

/// Updates registered variables from a parsed YAML tree.
///
/// Only existing variables are updated; unknown keys are logged and skipped,
/// never created implicitly.
pub fn load_from_yaml(root: &Value) {
    let mut nodes = Vec::new();
    flatten("", root, &mut nodes);

    for (key, node) in nodes {
        let Some(var) = get_base(&key) else {
            tracing::warn!(key = %key, "unrecognized configuration key");
            continue;
        };
        match node_text(node) {
            Ok(text) => {
                var.load_yaml(&text);
            }
            Err(err) => {
                tracing::error!(key = %key, error = %err, "failed to render configuration node");
            }
        }
    }
}

/// Loads every `.yml` file beneath a project-root-relative directory.
///
/// On a non-forced load, files whose modification timestamp matches the
/// cached value from a previous load are skipped. The cache is updated
/// before parsing, so a persistently broken file is not retried until it is
/// touched again. Parse and stat failures are logged and skip only the
/// offending file.
pub fn load_from_conf_dir(relative_dir: impl AsRef<Path>, force: bool) {
    let files = util::list_files_with_ext(relative_dir.as_ref(), "yml");

    for file in files {
        let mtime = match std::fs::metadata(&file).and_then(|meta| meta.modified()) {
            Ok(time) => util::unix_timestamp(time),
            Err(err) => {
                tracing::warn!(
                    file = %file.display(),
                    error = %err,
                    "skipping config file: failed to read modification time"
                );
                continue;
            }
        };

        {
            let mut cache = mtime_cache().lock().unwrap();
            if !force && cache.get(&file) == Some(&mtime) {
                tracing::info!(file = %file.display(), "skipping config file: unchanged");
                continue;
            }
            cache.insert(file.clone(), mtime);
        }

        let text = match std::fs::read_to_string(&file) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(file = %file.display(), error = %err, "failed to read config file");
                continue;
            }
        };

        match serde_yaml::from_str::<Value>(&text) {
            Ok(root) => {
                load_from_yaml(&root);
                tracing::info!(file = %file.display(), "loaded config file");
            }
            Err(err) => {
                tracing::error!(file = %file.display(), error = %err, "failed to parse config file");
            }
        }
    }
}
