//! Generic extensible registry
//!
//! Type-keyed lookup table behind every decision subsystem: advisers,
//! facilitators, interrupt handlers, timeout-tracker factories and step
//! handlers are all named instances of this pattern. Built once at process
//! start; read-only under concurrent lookups afterwards.

use ibai_core::{EngineError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

pub struct Registry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Display,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under `key`. Registering the same key twice is a
    /// wiring bug and fails fast.
    pub fn register(&self, key: K, value: V) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(EngineError::DuplicateRegistration {
                key: key.to_string(),
            });
        }
        entries.insert(key, value);
        Ok(())
    }

    /// Look up the handler for `key`; an unknown key is a wiring bug.
    pub fn obtain(&self, key: &K) -> Result<V> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::UnregisteredKey {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Display,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_obtain() {
        let registry: Registry<String, u32> = Registry::new();
        registry.register("a".to_string(), 1).unwrap();
        assert_eq!(registry.obtain(&"a".to_string()).unwrap(), 1);
        assert!(registry.contains(&"a".to_string()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry: Registry<String, u32> = Registry::new();
        registry.register("a".to_string(), 1).unwrap();
        let err = registry.register("a".to_string(), 2).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRegistration { .. }));
        // Original binding untouched
        assert_eq!(registry.obtain(&"a".to_string()).unwrap(), 1);
    }

    #[test]
    fn test_unregistered_key_fails() {
        let registry: Registry<String, u32> = Registry::new();
        let err = registry.obtain(&"ghost".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::UnregisteredKey { .. }));
    }

    #[test]
    fn test_concurrent_lookups() {
        use std::sync::Arc;
        let registry: Arc<Registry<String, u32>> = Arc::new(Registry::new());
        for i in 0..16 {
            registry.register(format!("k{}", i), i).unwrap();
        }
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..16 {
                        assert_eq!(registry.obtain(&format!("k{}", i)).unwrap(), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
