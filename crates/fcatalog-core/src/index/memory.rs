//! In-memory storage implementation, for tests.
//!
//! Uses a `HashMap` for the primary table and another for the per-coordinate
//! candidate index. All state lives behind `Arc<Mutex<_>>` so the handle is
//! cheaply `Clone`, mirroring concurrent catalog openers sharing one
//! backing store. Uses `lock().expect()`, which will panic if the mutex is
//! poisoned — acceptable for test code.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use super::{error::StorageError, Record, Storage};

#[derive(Default)]
struct Inner {
    records: HashMap<[u8; 32], Record>,
    /// (coordinate_index, coordinate_value) -> strong hashes with that value
    /// at that coordinate.
    coord_index: HashMap<(u32, u32), HashSet<[u8; 32]>>,
    closed: bool,
}

/// In-memory [`Storage`] backend.
#[derive(Clone)]
pub struct MemoryStorage {
    num_perms: u32,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    /// Create a new, empty catalog parameterized by `num_perms`.
    #[must_use]
    pub fn new(num_perms: u32) -> Self {
        Self { num_perms, inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

impl Storage for MemoryStorage {
    fn num_perms(&self) -> u32 {
        self.num_perms
    }

    #[allow(clippy::expect_used)]
    fn count(&self) -> Result<u64, StorageError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        if inner.closed {
            return Err(StorageError::Closed);
        }
        Ok(inner.records.len() as u64)
    }

    #[allow(clippy::expect_used)]
    fn upsert(&self, record: Record) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        if inner.closed {
            return Err(StorageError::Closed);
        }

        if let Some(previous) = inner.records.get(&record.strong_hash).cloned() {
            for (i, value) in previous.signature.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let key = (i as u32, *value);
                if let Some(set) = inner.coord_index.get_mut(&key) {
                    set.remove(&previous.strong_hash);
                }
            }
        }

        for (i, value) in record.signature.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let key = (i as u32, *value);
            inner.coord_index.entry(key).or_default().insert(record.strong_hash);
        }

        inner.records.insert(record.strong_hash, record);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn candidates(
        &self,
        signature: &[u32],
        exact_hash: [u8; 32],
    ) -> Result<Vec<Record>, StorageError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        if inner.closed {
            return Err(StorageError::Closed);
        }

        let mut hashes: HashSet<[u8; 32]> = HashSet::new();
        for (i, value) in signature.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let key = (i as u32, *value);
            if let Some(set) = inner.coord_index.get(&key) {
                hashes.extend(set.iter().copied());
            }
        }
        if inner.records.contains_key(&exact_hash) {
            hashes.insert(exact_hash);
        }

        Ok(hashes.into_iter().filter_map(|h| inner.records.get(&h).cloned()).collect())
    }

    #[allow(clippy::expect_used)]
    fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.closed = true;
        Ok(())
    }
}
