//! Per-connection protocol state machine.
//!
//! ```text
//! ┌─────────────┐  ChooseDb(valid)   ┌───────┐
//! │ AwaitChoose │───────────────────>│ Ready │
//! └─────────────┘                    └───────┘
//!        │                               │  │
//!        │ anything else                 │  │ AddFunction / RequestSimilars
//!        ↓                               │  │ (stays Ready)
//!   ┌────────┐<───────────────────────────┘  │
//!   │ Closed │<───── ChooseDb / anything else / connection close
//!   └────────┘
//! ```
//!
//! A session never replies to an error; the caller observes termination by
//! [`Session::is_closed`] returning `true` or the next `handle` call
//! returning [`SessionError::AlreadyClosed`]. Wire tags 0 (`ChooseDb`), 1
//! (`AddFunction`), 2 (`RequestSimilars`) are the only messages a session
//! accepts; `ResponseSimilars` (tag 3) arriving from a client is rejected by
//! the same catch-all arm that rejects any other out-of-state message.

use fcatalog_proto::message::Message;
use thiserror::Error;

use crate::index::{Similar, Storage, StorageError};

/// Opens the backing [`Storage`] for a catalog name, once a session commits
/// to one via `ChooseDb`.
///
/// Implemented by the server entry point (mapping a name to a `RedbStorage`
/// under its configured `db_base_path`) and by tests (mapping every name to
/// a shared or fresh `MemoryStorage`).
pub trait CatalogOpener: Send + Sync + 'static {
    /// The storage backend this opener produces.
    type Storage: Storage;

    /// Open (or create) the catalog named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the name cannot be resolved to a usable
    /// backend.
    fn open(&self, name: &str) -> Result<Self::Storage, StorageError>;
}

/// Errors terminating a [`Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// `ChooseDb` named a catalog outside the allowed alphabet.
    #[error("catalog name {0:?} is not allowed")]
    InvalidCatalogName(String),

    /// A message arrived that the current state does not accept.
    #[error("message not valid in the current session state")]
    UnexpectedMessage,

    /// A second `ChooseDb` arrived after the first already succeeded.
    #[error("a catalog was already chosen for this session")]
    DuplicateChooseDb,

    /// The backing index failed.
    #[error("index error: {0}")]
    Index(#[from] StorageError),

    /// A message arrived after the session already closed.
    #[error("session already closed")]
    AlreadyClosed,
}

enum SessionState<S> {
    AwaitChoose,
    Ready(S),
    Closed,
}

/// Closes `storage`, logging (not propagating) any failure.
///
/// Used on every path that abandons a `Ready` session: the original cause of
/// termination must reach the caller unobscured, per the "index close
/// failure does not mask the original cause" policy.
fn close_quietly<S: Storage>(storage: &S) {
    if let Err(err) = storage.close() {
        tracing::warn!(error = %err, "index close failed while terminating session");
    }
}

/// One connection's protocol state machine.
///
/// Generic over `O: CatalogOpener` rather than a trait object: `Storage` is
/// not required to be object-safe, and a session only ever needs the one
/// concrete backend its opener produces.
pub struct Session<O: CatalogOpener> {
    opener: O,
    state: SessionState<O::Storage>,
}

impl<O: CatalogOpener> Session<O> {
    /// Start a new session in `AwaitChoose`.
    pub fn new(opener: O) -> Self {
        Self { opener, state: SessionState::AwaitChoose }
    }

    /// `true` once the session has transitioned to `Closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// Process one incoming message, producing an optional reply.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for any message the current state rejects,
    /// for an invalid catalog name, or for an index failure. In every error
    /// case the session has already transitioned to `Closed` (and, if a
    /// catalog was open, its index has already been closed) before this
    /// method returns.
    pub fn handle(&mut self, message: Message) -> Result<Option<Message>, SessionError> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::AwaitChoose => self.handle_await_choose(message),
            SessionState::Ready(storage) => self.handle_ready(storage, message),
            SessionState::Closed => Err(SessionError::AlreadyClosed),
        }
    }

    fn handle_await_choose(&mut self, message: Message) -> Result<Option<Message>, SessionError> {
        let Message::ChooseDb { db_name } = message else {
            return Err(SessionError::UnexpectedMessage);
        };

        if !is_valid_catalog_name(&db_name) {
            return Err(SessionError::InvalidCatalogName(db_name));
        }

        let storage = self.opener.open(&db_name)?;
        self.state = SessionState::Ready(storage);
        Ok(None)
    }

    fn handle_ready(
        &mut self,
        storage: O::Storage,
        message: Message,
    ) -> Result<Option<Message>, SessionError> {
        match message {
            Message::AddFunction { func_name, func_comment, func_data } => {
                match storage.add(&func_name, &func_data, &func_comment) {
                    Ok(()) => {
                        self.state = SessionState::Ready(storage);
                        Ok(None)
                    },
                    Err(err) => {
                        close_quietly(&storage);
                        Err(SessionError::Index(err))
                    },
                }
            },
            Message::RequestSimilars { func_data, num_similars } => {
                match storage.similars(&func_data, num_similars as usize) {
                    Ok(similars) => {
                        self.state = SessionState::Ready(storage);
                        let similars: Vec<_> =
                            similars.into_iter().map(Similar::into_wire).collect();
                        Ok(Some(Message::ResponseSimilars { similars }))
                    },
                    Err(err) => {
                        close_quietly(&storage);
                        Err(SessionError::Index(err))
                    },
                }
            },
            Message::ChooseDb { .. } => {
                close_quietly(&storage);
                Err(SessionError::DuplicateChooseDb)
            },
            Message::ResponseSimilars { .. } => {
                close_quietly(&storage);
                Err(SessionError::UnexpectedMessage)
            },
        }
    }

    /// Close the session's underlying catalog, if one is open.
    ///
    /// Called on connection teardown. Idempotent: calling it again after the
    /// session has already reached `Closed` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the index fails to close.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if let SessionState::Ready(storage) = std::mem::replace(&mut self.state, SessionState::Closed) {
            return storage.close();
        }
        Ok(())
    }
}

/// `db_name` must be non-empty and drawn from `[A-Za-z0-9_]` — no path
/// separator, no `.`, so no `../` traversal is expressible.
fn is_valid_catalog_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryStorage;

    struct SharedMemoryOpener {
        num_perms: u32,
        catalogs: std::sync::Mutex<std::collections::HashMap<String, MemoryStorage>>,
    }

    impl SharedMemoryOpener {
        fn new(num_perms: u32) -> Self {
            Self { num_perms, catalogs: std::sync::Mutex::new(std::collections::HashMap::new()) }
        }
    }

    impl CatalogOpener for SharedMemoryOpener {
        type Storage = MemoryStorage;

        fn open(&self, name: &str) -> Result<MemoryStorage, StorageError> {
            #[allow(clippy::expect_used)]
            let mut catalogs = self.catalogs.lock().expect("mutex poisoned");
            Ok(catalogs.entry(name.to_string()).or_insert_with(|| MemoryStorage::new(self.num_perms)).clone())
        }
    }

    fn opener() -> SharedMemoryOpener {
        SharedMemoryOpener::new(16)
    }

    #[test]
    fn first_message_must_be_choose_db() {
        let mut session = Session::new(opener());
        let result = session.handle(Message::RequestSimilars { func_data: vec![1], num_similars: 1 });
        assert!(matches!(result, Err(SessionError::UnexpectedMessage)));
        assert!(session.is_closed());
    }

    #[test]
    fn invalid_catalog_name_closes_without_reply() {
        let mut session = Session::new(opener());
        let result = session.handle(Message::ChooseDb { db_name: "../etc".to_string() });
        assert!(matches!(result, Err(SessionError::InvalidCatalogName(_))));
        assert!(session.is_closed());
    }

    #[test]
    fn valid_choose_db_transitions_to_ready() {
        let mut session = Session::new(opener());
        let result = session.handle(Message::ChooseDb { db_name: "my_db".to_string() });
        assert!(matches!(result, Ok(None)));
        assert!(!session.is_closed());
    }

    #[test]
    fn second_choose_db_closes_the_session() {
        let mut session = Session::new(opener());
        session.handle(Message::ChooseDb { db_name: "my_db".to_string() }).unwrap();
        let result = session.handle(Message::ChooseDb { db_name: "other_db".to_string() });
        assert!(matches!(result, Err(SessionError::DuplicateChooseDb)));
        assert!(session.is_closed());
    }

    #[test]
    fn empty_catalog_query_returns_zero_results() {
        let mut session = Session::new(opener());
        session.handle(Message::ChooseDb { db_name: "my_db".to_string() }).unwrap();
        let reply = session
            .handle(Message::RequestSimilars { func_data: b"function data example".to_vec(), num_similars: 0 })
            .unwrap();
        match reply {
            Some(Message::ResponseSimilars { similars }) => assert!(similars.is_empty()),
            other => panic!("expected ResponseSimilars, got {other:?}"),
        }
    }

    #[test]
    fn add_then_query_orders_by_grade_with_near_match_first() {
        let mut session = Session::new(opener());
        session.handle(Message::ChooseDb { db_name: "my_db".to_string() }).unwrap();

        session
            .handle(Message::AddFunction {
                func_name: "name1".to_string(),
                func_comment: "comment1".to_string(),
                func_data: b"please locate similar function1 data".to_vec(),
            })
            .unwrap();
        session
            .handle(Message::AddFunction {
                func_name: "name2".to_string(),
                func_comment: "comment2".to_string(),
                func_data: b"please locate similar function2 data".to_vec(),
            })
            .unwrap();
        session
            .handle(Message::AddFunction {
                func_name: "name3".to_string(),
                func_comment: "comment3".to_string(),
                func_data: b"02938459something entirely unrelated".to_vec(),
            })
            .unwrap();

        let reply = session
            .handle(Message::RequestSimilars {
                func_data: b"please locate similar function2 data".to_vec(),
                num_similars: 3,
            })
            .unwrap();

        match reply {
            Some(Message::ResponseSimilars { similars }) => {
                assert_eq!(similars.len(), 2);
                assert_eq!(similars[0].name, "name2");
                assert_eq!(similars[0].grade, 16);
                assert_eq!(similars[1].name, "name1");
                assert!(similars[1].grade < 16);
            },
            other => panic!("expected ResponseSimilars, got {other:?}"),
        }
    }

    #[test]
    fn closing_an_await_choose_session_is_a_harmless_no_op() {
        let mut session = Session::new(opener());
        assert!(session.close().is_ok());
        assert!(session.is_closed());
    }

    #[test]
    fn response_similars_from_a_client_is_rejected() {
        let mut session = Session::new(opener());
        session.handle(Message::ChooseDb { db_name: "my_db".to_string() }).unwrap();
        let result = session.handle(Message::ResponseSimilars { similars: vec![] });
        assert!(matches!(result, Err(SessionError::UnexpectedMessage)));
        assert!(session.is_closed());
    }
}
