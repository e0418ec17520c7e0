//! Per-connection application context.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

type Value = Arc<dyn Any + Send + Sync>;

/// String-keyed store of arbitrary values owned by application code.
///
/// Lives exactly as long as its [`Client`](crate::Client). Values are
/// retrieved by type; a lookup with the wrong type returns `None`.
#[derive(Default)]
pub struct Context {
    values: RwLock<HashMap<String, Value>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), Arc::new(value));
    }

    /// Get a value of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.values.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Remove a value, returning whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if the context is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.read();
        let mut keys: Vec<&str> = values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let ctx = Context::new();
        ctx.insert("user", "alice".to_string());
        ctx.insert("visits", 3_u32);

        assert_eq!(ctx.get::<String>("user").as_deref().map(String::as_str), Some("alice"));
        assert_eq!(ctx.get::<u32>("visits").as_deref(), Some(&3));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_get_wrong_type() {
        let ctx = Context::new();
        ctx.insert("visits", 3_u32);
        assert!(ctx.get::<String>("visits").is_none());
        assert!(ctx.contains("visits"));
    }

    #[test]
    fn test_remove() {
        let ctx = Context::new();
        ctx.insert("k", 1_i64);
        assert!(ctx.remove("k"));
        assert!(!ctx.remove("k"));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_debug_lists_keys() {
        let ctx = Context::new();
        ctx.insert("b", 1_u8);
        ctx.insert("a", 2_u8);
        assert_eq!(format!("{:?}", ctx), r#"Context { keys: ["a", "b"] }"#);
    }
}
