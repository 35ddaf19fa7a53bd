//! Redb-backed durable storage.
//!
//! One `redb::Database` per catalog. Three tables, opened (and created if
//! absent) in a single write transaction at open time, mirroring the
//! teacher's "open all tables once, in one transaction" pattern:
//!
//! - `META` — single key `num_perms` storing the catalog's fixed signature
//!   length; checked on every reopen (the compatibility invariant).
//! - `RECORDS` — strong hash (32 bytes) -> CBOR-encoded `(name, comment,
//!   signature)`.
//! - `COORDS` — a multimap keyed by `(coordinate_index, coordinate_value)`
//!   (8 big-endian bytes) mapping to the strong hashes whose signature holds
//!   that value at that coordinate. This is the Rust realization of the
//!   original implementation's one-SQL-index-per-signature-column design:
//!   candidate generation unions the per-coordinate lookups instead of a SQL
//!   `UNION` over per-column indexed selects.

use std::{
    path::Path,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};

use redb::{Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    TableDefinition};
use serde::{Deserialize, Serialize};

use super::{error::StorageError, Record, Storage};

const META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("meta");
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");
const COORDS: MultimapTableDefinition<&[u8], &[u8]> = MultimapTableDefinition::new("coords");

const NUM_PERMS_KEY: &[u8] = b"num_perms";

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    name: String,
    comment: String,
    signature: Vec<u32>,
}

fn coord_key(index: usize, value: u32) -> [u8; 8] {
    let mut key = [0u8; 8];
    #[allow(clippy::cast_possible_truncation)]
    key[0..4].copy_from_slice(&(index as u32).to_be_bytes());
    key[4..8].copy_from_slice(&value.to_be_bytes());
    key
}

fn backend_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn codec_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Codec(err.to_string())
}

/// Durable [`Storage`] backend on top of [`redb`].
///
/// `Clone` is cheap (`Arc`); multiple openers of the same on-disk file
/// safely share it, matching redb's own concurrent-openers guarantee.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
    num_perms: u32,
    closed: Arc<AtomicBool>,
}

impl RedbStorage {
    /// Open (creating if absent) a catalog at `path` parameterized by
    /// `num_perms`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NumPermsMismatch`] if the catalog already
    /// exists on disk with a different `num_perms`, or
    /// [`StorageError::Backend`] if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>, num_perms: u32) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(backend_err)?;

        let txn = db.begin_write().map_err(backend_err)?;
        {
            let mut meta = txn.open_table(META).map_err(backend_err)?;
            match meta.get(NUM_PERMS_KEY).map_err(backend_err)? {
                Some(existing) => {
                    let bytes = existing.value();
                    let on_disk = u32::from_le_bytes(
                        bytes.try_into().map_err(|_| codec_err("malformed num_perms entry"))?,
                    );
                    if on_disk != num_perms {
                        return Err(StorageError::NumPermsMismatch {
                            on_disk,
                            requested: num_perms,
                        });
                    }
                },
                None => {
                    meta.insert(NUM_PERMS_KEY, &num_perms.to_le_bytes()[..])
                        .map_err(backend_err)?;
                },
            }

            let _ = txn.open_table(RECORDS).map_err(backend_err)?;
            let _ = txn.open_multimap_table(COORDS).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;

        Ok(Self { db: Arc::new(db), num_perms, closed: Arc::new(AtomicBool::new(false)) })
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl Storage for RedbStorage {
    fn num_perms(&self) -> u32 {
        self.num_perms
    }

    fn count(&self) -> Result<u64, StorageError> {
        self.check_open()?;
        let txn = self.db.begin_read().map_err(backend_err)?;
        let records = txn.open_table(RECORDS).map_err(backend_err)?;
        records.len().map_err(backend_err)
    }

    fn upsert(&self, record: Record) -> Result<(), StorageError> {
        self.check_open()?;
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut records = txn.open_table(RECORDS).map_err(backend_err)?;
            let mut coords = txn.open_multimap_table(COORDS).map_err(backend_err)?;

            if let Some(existing) = records.get(&record.strong_hash[..]).map_err(backend_err)? {
                let previous: StoredRecord =
                    ciborium::de::from_reader(existing.value()).map_err(codec_err)?;
                for (i, value) in previous.signature.iter().enumerate() {
                    let key = coord_key(i, *value);
                    coords
                        .remove(&key[..], &record.strong_hash[..])
                        .map_err(backend_err)?;
                }
            }

            let stored = StoredRecord {
                name: record.name.clone(),
                comment: record.comment.clone(),
                signature: record.signature.clone(),
            };
            let mut bytes = Vec::new();
            ciborium::ser::into_writer(&stored, &mut bytes).map_err(codec_err)?;
            records.insert(&record.strong_hash[..], &bytes[..]).map_err(backend_err)?;

            for (i, value) in record.signature.iter().enumerate() {
                let key = coord_key(i, *value);
                coords.insert(&key[..], &record.strong_hash[..]).map_err(backend_err)?;
            }
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    fn candidates(
        &self,
        signature: &[u32],
        exact_hash: [u8; 32],
    ) -> Result<Vec<Record>, StorageError> {
        self.check_open()?;
        let txn = self.db.begin_read().map_err(backend_err)?;
        let records = txn.open_table(RECORDS).map_err(backend_err)?;
        let coords = txn.open_multimap_table(COORDS).map_err(backend_err)?;

        let mut hashes: Vec<[u8; 32]> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (i, value) in signature.iter().enumerate() {
            let key = coord_key(i, *value);
            let mut iter = coords.get(&key[..]).map_err(backend_err)?;
            for entry in iter.by_ref() {
                let entry = entry.map_err(backend_err)?;
                let mut hash = [0u8; 32];
                hash.copy_from_slice(entry.value());
                if seen.insert(hash) {
                    hashes.push(hash);
                }
            }
        }

        if records.get(&exact_hash[..]).map_err(backend_err)?.is_some() && seen.insert(exact_hash)
        {
            hashes.push(exact_hash);
        }

        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(raw) = records.get(&hash[..]).map_err(backend_err)? {
                let stored: StoredRecord =
                    ciborium::de::from_reader(raw.value()).map_err(codec_err)?;
                out.push(Record {
                    strong_hash: hash,
                    name: stored.name,
                    comment: stored.comment,
                    signature: stored.signature,
                });
            }
        }
        Ok(out)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
