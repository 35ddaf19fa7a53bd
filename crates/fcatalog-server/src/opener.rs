//! Maps a validated catalog name to its on-disk [`RedbStorage`] handle.

use std::path::PathBuf;

use fcatalog_core::{CatalogOpener, RedbStorage, StorageError};

/// Opens catalogs as `<db_base_path>/<name>.redb`.
///
/// Cheap to clone: one clone per accepted connection, each clone opening its
/// own `RedbStorage` handle onto whatever file the session's `ChooseDb`
/// names — redb itself tolerates concurrent openers of the same file.
#[derive(Debug, Clone)]
pub struct RedbCatalogOpener {
    db_base_path: PathBuf,
    num_hashes: u32,
}

impl RedbCatalogOpener {
    /// Build an opener rooted at `db_base_path`, parameterizing every
    /// catalog it opens (new or existing) with `num_hashes`.
    #[must_use]
    pub fn new(db_base_path: PathBuf, num_hashes: u32) -> Self {
        Self { db_base_path, num_hashes }
    }
}

impl CatalogOpener for RedbCatalogOpener {
    type Storage = RedbStorage;

    fn open(&self, name: &str) -> Result<RedbStorage, StorageError> {
        let path = self.db_base_path.join(format!("{name}.redb"));
        RedbStorage::open(path, self.num_hashes)
    }
}
