//! Configuration variables: typed cells with change notification.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::codec::ConfigValue;

/// Process-global listener id allocator. Ids are monotonically increasing
/// and never reused, so a stale id can never address a newer callback.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Change callback invoked with `(old_value, new_value)`.
pub type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// Type-erased view of a configuration variable.
///
/// The registry stores variables behind this trait; the typed handle is
/// recovered with a runtime-checked downcast via [`VarBase::as_any_arc`].
pub trait VarBase: Send + Sync {
    /// The variable's dotted key.
    fn name(&self) -> &str;

    /// Human-readable description supplied at creation.
    fn description(&self) -> &str;

    /// Readable name of the value's runtime type.
    fn type_name(&self) -> &'static str;

    /// Serializes the current value to its YAML form.
    ///
    /// On codec failure this logs at error level and returns an empty
    /// string; it never propagates the failure.
    fn to_yaml(&self) -> String;

    /// Parses YAML text and assigns the result as the new value.
    ///
    /// Returns `false` on codec failure; the current value is unchanged.
    fn load_yaml(&self, text: &str) -> bool;

    /// Upcast for the registry's runtime-checked downcast.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A named, typed configuration cell with change listeners.
///
/// Handles are shared (`Arc`) and internally synchronized. Listeners run
/// inline on the thread that calls [`set_value`](Self::set_value), in
/// ascending id order, against a snapshot of the listener table — a callback
/// may add or remove listeners without disturbing the in-flight dispatch.
pub struct ConfigVar<T> {
    name: String,
    description: String,
    value: RwLock<T>,
    listeners: Mutex<BTreeMap<u64, Listener<T>>>,
}

impl<T> ConfigVar<T>
where
    T: ConfigValue + Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(name: &str, default_value: T, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value: RwLock::new(default_value),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns a clone of the current value.
    pub fn value(&self) -> T {
        self.value.read().unwrap().clone()
    }

    /// Installs a new value, notifying listeners on change.
    ///
    /// Equal values (value equality, not identity) are a no-op. Otherwise
    /// the old value is snapshotted, the new value installed, and every
    /// registered listener invoked with `(old, new)` in ascending id order.
    pub fn set_value(&self, value: T) {
        let old = {
            let mut current = self.value.write().unwrap();
            if *current == value {
                return;
            }
            std::mem::replace(&mut *current, value.clone())
        };

        let snapshot: Vec<Listener<T>> = {
            let listeners = self.listeners.lock().unwrap();
            listeners.values().cloned().collect()
        };
        for listener in snapshot {
            listener(&old, &value);
        }
    }

    /// Registers a change callback and returns its id.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + Send + Sync + 'static) -> u64 {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id, Arc::new(listener));
        id
    }

    /// Removes the callback with the given id, if present.
    pub fn del_listener(&self, id: u64) {
        self.listeners.lock().unwrap().remove(&id);
    }

    /// Returns the callback with the given id, if present.
    pub fn get_listener(&self, id: u64) -> Option<Listener<T>> {
        self.listeners.lock().unwrap().get(&id).cloned()
    }

    /// Drops every registered callback.
    pub fn clear_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

impl<T> VarBase for ConfigVar<T>
where
    T: ConfigValue + Clone + PartialEq + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_yaml(&self) -> String {
        match self.value.read().unwrap().to_yaml_string() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(
                    name = %self.name,
                    value_type = %self.type_name(),
                    error = %err,
                    "failed to serialize configuration value"
                );
                String::new()
            }
        }
    }

    fn load_yaml(&self, text: &str) -> bool {
        match T::from_yaml_str(text) {
            Ok(value) => {
                self.set_value(value);
                true
            }
            Err(err) => {
                tracing::error!(
                    name = %self.name,
                    value_type = %self.type_name(),
                    input = %text,
                    error = %err,
                    "failed to parse configuration value"
                );
                false
            }
        }
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ConfigVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigVar")
            .field("name", &self.name)
            .field("value", &*self.value.read().unwrap())
            .finish_non_exhaustive()
    }
}
