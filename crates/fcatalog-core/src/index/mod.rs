//! The persistent similarity index.
//!
//! A catalog is a named collection of [`Record`]s sharing one `num_perms`.
//! [`Storage`] is the behavioral contract; [`memory::MemoryStorage`] and
//! [`redb_backend::RedbStorage`] are the two realizations this crate ships.

mod error;
mod memory;
mod redb_backend;

use fcatalog_proto::message::SimilarEntry;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use redb_backend::RedbStorage;

use crate::signer::{sign, strong_hash};

/// A stored (reversed function) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Strong content hash — the primary key.
    pub strong_hash: [u8; 32],
    /// Human name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// The catalog1 MinHash signature, `num_perms` coordinates long.
    pub signature: Vec<u32>,
}

/// One `similars` result: a [`Record`] plus how many signature coordinates
/// agreed with the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Similar {
    /// The candidate record.
    pub record: Record,
    /// Number of signature coordinates equal to the query's, in `[0, num_perms]`.
    pub grade: u32,
}

impl Similar {
    /// Convert to the wire shape used by `ResponseSimilars`.
    #[must_use]
    pub fn into_wire(self) -> SimilarEntry {
        SimilarEntry { name: self.record.name, comment: self.record.comment, grade: self.grade }
    }
}

/// Behavioral contract of a catalog's persistent backing store.
///
/// Implementations are synchronous: the index's own I/O is not expected to
/// dominate scheduling for a single add/query, so there is no async seam
/// here (unlike the protocol's frame I/O, which is always async).
pub trait Storage: Send + Sync + 'static {
    /// This catalog's fixed signature length.
    fn num_perms(&self) -> u32;

    /// Number of records currently stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn count(&self) -> Result<u64, StorageError>;

    /// Sign and upsert `body` under `name`/`comment`.
    ///
    /// Replaces wholesale any existing record sharing the same strong hash.
    /// Each call is its own durably-committed transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn add(&self, name: &str, body: &[u8], comment: &str) -> Result<(), StorageError> {
        let signature = sign(body, self.num_perms());
        let hash = strong_hash(body);
        self.upsert(Record { strong_hash: hash, name: name.to_string(),
            comment: comment.to_string(), signature })
    }

    /// Insert or replace `record`, keyed by its strong hash.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn upsert(&self, record: Record) -> Result<(), StorageError>;

    /// Candidate records agreeing with `signature` in at least one
    /// coordinate, plus (if present) the record whose strong hash equals
    /// `exact_hash` — the raw union described in `similars`' contract,
    /// before grading, ordering, or truncation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn candidates(
        &self,
        signature: &[u32],
        exact_hash: [u8; 32],
    ) -> Result<Vec<Record>, StorageError>;

    /// Flush and release resources. Further operations on a closed store
    /// fail.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn close(&self) -> Result<(), StorageError>;

    /// Query for the top-`k` records most similar to `body`.
    ///
    /// Default implementation built on [`Storage::candidates`]: grades each
    /// candidate by coordinate agreement, sorts by grade descending, forces
    /// the exact strong-hash match (if any) to position 0, and truncates to
    /// `k`. Tie-breaking among equal grades elsewhere in the list is
    /// unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn similars(&self, body: &[u8], k: usize) -> Result<Vec<Similar>, StorageError> {
        let signature = sign(body, self.num_perms());
        let exact_hash = strong_hash(body);

        let candidates = self.candidates(&signature, exact_hash)?;

        let mut graded: Vec<Similar> = candidates
            .into_iter()
            .map(|record| {
                let grade = grade_of(&record.signature, &signature);
                Similar { record, grade }
            })
            .collect();

        graded.sort_by(|a, b| b.grade.cmp(&a.grade));

        if let Some(pos) = graded.iter().position(|s| s.record.strong_hash == exact_hash) {
            let exact = graded.remove(pos);
            graded.insert(0, exact);
        }

        graded.truncate(k);
        Ok(graded)
    }
}

/// Count of coordinates where `stored` and `query` agree.
fn grade_of(stored: &[u32], query: &[u32]) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let grade = stored.iter().zip(query.iter()).filter(|(a, b)| a == b).count() as u32;
    grade
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_of_counts_equal_coordinates() {
        assert_eq!(grade_of(&[1, 2, 3, 4], &[1, 9, 3, 9]), 2);
        assert_eq!(grade_of(&[1, 2, 3, 4], &[1, 2, 3, 4]), 4);
        assert_eq!(grade_of(&[1, 2, 3, 4], &[9, 9, 9, 9]), 0);
    }
}
