//! Host-scoped shared attributes
//!
//! Values shared between unrelated documents live here, owned by the
//! [`DocumentHost`](crate::document::DocumentHost) that composes the system.
//! Dropping the host drops the attributes.

use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct Attributes {
    values: DashMap<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one under the same key
    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T) -> Option<Value> {
        self.values.insert(key.to_string(), Arc::new(value))
    }

    /// Store `value` unless the key is already set; returns the stored value
    pub fn set_if_absent<T: Any + Send + Sync>(&self, key: &str, value: T) -> Value {
        let entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(value));
        Arc::clone(entry.value())
    }

    /// Typed lookup; `None` when missing or of another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.values.get(key)?.value());
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        f.debug_struct("Attributes").field("keys", &keys).finish()
    }
}
