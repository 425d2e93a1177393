//! In-memory storage implementation

use super::value::Value;
use bytes::Bytes;
use parking_lot::RwLock;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// Type alias for our hash map with SipHasher
type StoreMap = HashMap<Bytes, Value, BuildHasherDefault<SipHasher13>>;

/// Outcome of a rename attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The source key was moved
    Renamed,
    /// The source key does not exist
    NoSuchKey,
    /// The destination exists and the rename required it to be absent
    DestinationExists,
}

/// In-memory key-value dictionary
///
/// Internally synchronised: any number of connection tasks may read and
/// write concurrently through a shared reference.
pub struct MemoryStore {
    /// The main storage map
    store: RwLock<StoreMap>,
}

impl MemoryStore {
    /// Create a new memory store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new memory store with specified initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        MemoryStore {
            store: RwLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            )),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.store.read().get(key).cloned()
    }

    /// Check if a key exists
    pub fn exists(&self, key: &[u8]) -> bool {
        self.store.read().contains_key(key)
    }

    /// Set a key unconditionally, returns 1 if the key is new and 0 if a value was replaced
    pub fn put(&self, key: Bytes, value: Value) -> i64 {
        match self.replace(key, value) {
            Some(_) => 0,
            None => 1,
        }
    }

    /// Set a key unconditionally and hand back the previous value
    pub fn replace(&self, key: Bytes, value: Value) -> Option<Value> {
        self.store.write().insert(key, value)
    }

    /// Set a key only if it does not exist, returns 1 if stored
    pub fn put_if_absent(&self, key: Bytes, value: Value) -> i64 {
        let mut store = self.store.write();
        if store.contains_key(&key) {
            return 0;
        }
        store.insert(key, value);
        1
    }

    /// Set a key only if it already exists, returns 1 if stored
    pub fn put_if_exists(&self, key: Bytes, value: Value) -> i64 {
        let mut store = self.store.write();
        match store.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                1
            }
            None => 0,
        }
    }

    /// Delete a key, returning the removed value
    pub fn remove(&self, key: &[u8]) -> Option<Value> {
        self.store.write().remove(key)
    }

    /// Delete several keys, returns how many actually existed
    pub fn removes(&self, keys: &[Bytes]) -> i64 {
        let mut store = self.store.write();
        keys.iter().filter(|key| store.remove(key.as_ref()).is_some()).count() as i64
    }

    /// Move `src` to `dest` under a single lock
    pub fn rename(&self, src: &[u8], dest: Bytes, only_if_absent: bool) -> RenameOutcome {
        let mut store = self.store.write();
        if !store.contains_key(src) {
            return RenameOutcome::NoSuchKey;
        }
        if only_if_absent && store.contains_key(&dest) {
            return RenameOutcome::DestinationExists;
        }
        if let Some(value) = store.remove(src) {
            store.insert(dest, value);
        }
        RenameOutcome::Renamed
    }

    /// Remove all keys
    pub fn clear(&self) {
        self.store.write().clear();
    }

    /// Visit every entry until the consumer returns false
    pub fn for_each<F>(&self, mut consumer: F)
    where
        F: FnMut(&Bytes, &Value) -> bool,
    {
        for (key, value) in self.store.read().iter() {
            if !consumer(key, value) {
                break;
            }
        }
    }

    /// Get the number of keys
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_put_get() {
        let store = MemoryStore::new();
        assert_eq!(store.put(Bytes::from("key1"), Value::string("value1")), 1);
        assert_eq!(store.put(Bytes::from("key1"), Value::string("value2")), 0);

        let value = store.get(b"key1").unwrap();
        assert_eq!(value.as_string().unwrap(), &Bytes::from("value2"));
    }

    #[test]
    fn test_conditional_puts() {
        let store = MemoryStore::new();
        assert_eq!(store.put_if_exists(Bytes::from("k"), Value::string("a")), 0);
        assert!(!store.exists(b"k"));

        assert_eq!(store.put_if_absent(Bytes::from("k"), Value::string("a")), 1);
        assert_eq!(store.put_if_absent(Bytes::from("k"), Value::string("b")), 0);
        assert_eq!(store.get(b"k"), Some(Value::string("a")));

        assert_eq!(store.put_if_exists(Bytes::from("k"), Value::string("c")), 1);
        assert_eq!(store.get(b"k"), Some(Value::string("c")));
    }

    #[test]
    fn test_removes_counts_existing_only() {
        let store = MemoryStore::new();
        store.put(Bytes::from("a"), Value::string("1"));
        store.put(Bytes::from("b"), Value::string("2"));

        let removed = store.removes(&[Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rename() {
        let store = MemoryStore::new();
        assert_eq!(store.rename(b"src", Bytes::from("dst"), false), RenameOutcome::NoSuchKey);

        store.put(Bytes::from("src"), Value::string("v"));
        store.put(Bytes::from("dst"), Value::string("old"));
        assert_eq!(store.rename(b"src", Bytes::from("dst"), true), RenameOutcome::DestinationExists);
        assert_eq!(store.rename(b"src", Bytes::from("dst"), false), RenameOutcome::Renamed);

        assert!(!store.exists(b"src"));
        assert_eq!(store.get(b"dst"), Some(Value::string("v")));
    }

    #[test]
    fn test_for_each_stops_early() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.put(Bytes::from(format!("key{}", i)), Value::string("v"));
        }

        let mut visited = 0;
        store.for_each(|_, _| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_concurrent_writers() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.put(Bytes::from(format!("{}-{}", t, i)), Value::string("v"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
