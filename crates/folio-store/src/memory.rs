use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::Store;

/// In-memory, HashMap-based store.
///
/// Intended for tests and embedding. Values live behind a `RwLock` and are
/// cloned on read. `destroy` clears the map.
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all values.
    pub fn total_bytes(&self) -> u64 {
        self.values
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn create(&self) -> StoreResult<()> {
        self.values.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn destroy(&self) -> StoreResult<()> {
        self.values.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let map = self.values.read().expect("lock poisoned");
        map.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut map = self.values.write().expect("lock poisoned");
        map.remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let map = self.values.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.read().expect("lock poisoned").contains_key(key))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let store = MemoryStore::new();
        store.set("k", b"value").unwrap();
        assert_eq!(store.get("k").unwrap(), b"value");
    }

    #[test]
    fn set_replaces() {
        let store = MemoryStore::new();
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_present_and_missing() {
        let store = MemoryStore::new();
        store.set("k", b"v").unwrap();
        store.delete("k").unwrap();
        assert!(!store.contains("k").unwrap());
        assert!(store.delete("k").unwrap_err().is_not_found());
    }

    #[test]
    fn keys_lists_everything() {
        let store = MemoryStore::new();
        store.set("a", b"1").unwrap();
        store.set("b", b"22").unwrap();
        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(store.total_bytes(), 3);
    }

    // -----------------------------------------------------------------------
    // Streaming defaults
    // -----------------------------------------------------------------------

    #[test]
    fn streaming_round_trip() {
        use std::io::Read;

        let store = MemoryStore::new();
        let written = store
            .set_from_reader("blob", &mut &b"streamed bytes"[..])
            .unwrap();
        assert_eq!(written, 14);

        let mut out = Vec::new();
        store.get_reader("blob").unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"streamed bytes");
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn destroy_clears() {
        let store = MemoryStore::default();
        store.set("k", b"v").unwrap();
        store.destroy().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn debug_format() {
        let store = MemoryStore::new();
        store.set("x", b"y").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryStore"));
        assert!(debug.contains("key_count"));
    }
}
