//! Lock helpers.
//!
//! Every component keeps its rows behind `std::sync` locks. A panic while a
//! lock is held must not take the whole service down with it, so poisoned
//! locks are recovered instead of unwrapped.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

// =============================================================================
// Poison-Recovering Guards
// =============================================================================

/// Acquires a read lock, recovering from poison if necessary.
pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        error!("RwLock was poisoned on read, recovering");
        poisoned.into_inner()
    })
}

/// Acquires a write lock, recovering from poison if necessary.
pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        error!("RwLock was poisoned on write, recovering");
        poisoned.into_inner()
    })
}

/// Acquires a mutex, recovering from poison if necessary.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        error!("Mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

// =============================================================================
// Row Locks
// =============================================================================

/// A map of independently locked rows.
///
/// The outer map lock is only held long enough to find or insert a row
/// handle; all work on a row happens under that row's own mutex, so writers
/// on different keys never wait on each other.
pub struct RowMap<K, V> {
    rows: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> RowMap<K, V>
where
    K: Eq + Hash + Copy,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a map from loaded rows.
    pub fn from_rows(rows: impl IntoIterator<Item = (K, V)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(k, v)| (k, Arc::new(Mutex::new(v))))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Returns the row handle, if the row exists.
    pub fn get(&self, key: K) -> Option<Arc<Mutex<V>>> {
        read_lock(&self.rows).get(&key).cloned()
    }

    /// Returns the row handle, creating the row with `init` if absent.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> Arc<Mutex<V>> {
        if let Some(row) = self.get(key) {
            return row;
        }
        write_lock(&self.rows)
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// Snapshot of all row handles.
    pub fn handles(&self) -> Vec<(K, Arc<Mutex<V>>)> {
        read_lock(&self.rows)
            .iter()
            .map(|(k, v)| (*k, Arc::clone(v)))
            .collect()
    }

    /// Drops a row. Holders of its handle keep a detached copy.
    pub fn remove(&self, key: K) -> Option<Arc<Mutex<V>>> {
        write_lock(&self.rows).remove(&key)
    }
}

impl<K, V> Default for RowMap<K, V>
where
    K: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_get_or_insert_returns_same_row() {
        let map: RowMap<u64, u32> = RowMap::new();
        let a = map.get_or_insert_with(1, || 5);
        let b = map.get_or_insert_with(1, || 9);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*lock(&b), 5);

        assert!(map.remove(1).is_some());
        assert!(map.get(1).is_none());
        assert_eq!(*lock(&map.get_or_insert_with(1, || 9)), 9);
    }

    #[test]
    fn test_poisoned_mutex_recovers() {
        let row = Arc::new(Mutex::new(1u32));
        let poisoner = Arc::clone(&row);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(row.is_poisoned());
        *lock(&row) += 1;
        assert_eq!(*lock(&row), 2);
    }
}
