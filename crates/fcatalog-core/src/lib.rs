//! Signer, persistent similarity index, and session state machine for the
//! fcatalog protocol.
//!
//! [`signer`] turns a body into a MinHash-style signature and a strong
//! content hash. [`index`] persists [`index::Record`]s keyed by that hash
//! and answers approximate-similarity queries. [`session`] drives one
//! connection's protocol state machine on top of an [`index::Storage`]
//! backend, built from decoded `fcatalog_proto::Message`s.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod index;
pub mod session;
pub mod signer;

pub use index::{MemoryStorage, RedbStorage, Record, Similar, Storage, StorageError};
pub use session::{CatalogOpener, Session, SessionError};
pub use signer::{sign, strong_hash};
