//! Production TCP server for the fcatalog function-similarity protocol.
//!
//! Wires [`fcatalog_proto::FrameIo`] (length-prefixed transport),
//! [`fcatalog_proto::Message`] (the wire codec), and
//! [`fcatalog_core::Session`] (the per-connection protocol state machine)
//! onto a plain `tokio::net::TcpListener` accept loop — one spawned task per
//! connection, each running a fully sequential recv/dispatch/send loop with
//! no shared mutable state beyond the catalogs' own `RedbStorage` handles.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod opener;

pub use error::ServerError;
pub use opener::RedbCatalogOpener;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
};

use bytes::BytesMut;
use fcatalog_core::Session;
use fcatalog_proto::{DEFAULT_MAX_FRAME_LENGTH, FrameIo, Message};
use tokio::net::{TcpListener, TcpStream};

/// Default cap on simultaneously active connections, mirroring the teacher's
/// `DriverConfig::max_connections` default.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Configuration for a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to, e.g. `"0.0.0.0:7867"`.
    pub bind_address: String,
    /// Directory under which each catalog's `<name>.redb` file lives.
    pub db_base_path: PathBuf,
    /// `num_perms` applied to every catalog this server opens or creates.
    pub num_hashes: u32,
    /// Maximum accepted frame length, in bytes.
    pub max_frame_length: u32,
    /// Maximum number of simultaneously active connections. Connections
    /// accepted beyond this cap are closed immediately without being handed
    /// to a [`Session`].
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7867".to_string(),
            db_base_path: PathBuf::from("./fcatalog-data"),
            num_hashes: 16,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// A bound, not-yet-running fcatalog server.
pub struct Server {
    listener: TcpListener,
    opener: RedbCatalogOpener,
    max_frame_length: u32,
    max_connections: usize,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listening socket and prepare `config.db_base_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BasePath`] if the catalog directory cannot be
    /// created, or [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&config.db_base_path).map_err(|source| ServerError::BasePath {
            path: config.db_base_path.display().to_string(),
            source,
        })?;

        let listener =
            TcpListener::bind(&config.bind_address).await.map_err(|source| ServerError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;

        let opener = RedbCatalogOpener::new(config.db_base_path, config.num_hashes);

        Ok(Self {
            listener,
            opener,
            max_frame_length: config.max_frame_length,
            max_connections: config.max_connections,
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The address this server is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until an unrecoverable listener error occurs.
    ///
    /// Each accepted connection is handled independently; failures on one
    /// connection never propagate here. Connections accepted once
    /// `max_connections` are already active are closed immediately, without
    /// ever reaching a [`Session`] — mirroring the teacher driver's
    /// "reject once the cap is hit" behavior.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if `accept` itself fails.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;

            if self.active_connections.load(Ordering::Acquire) >= self.max_connections {
                tracing::warn!(%peer, max_connections = self.max_connections, "max connections exceeded, rejecting");
                drop(stream);
                continue;
            }

            let opener = self.opener.clone();
            let max_frame_length = self.max_frame_length;
            let active_connections = Arc::clone(&self.active_connections);
            active_connections.fetch_add(1, Ordering::AcqRel);

            tokio::spawn(async move {
                tracing::debug!(%peer, "connection accepted");
                handle_connection(stream, opener, max_frame_length).await;
                active_connections.fetch_sub(1, Ordering::AcqRel);
                tracing::debug!(%peer, "connection closed");
            });
        }
    }
}

/// Drive one connection's sequential recv/dispatch/send loop until the
/// session closes, for any reason.
///
/// Codec and protocol errors terminate the loop silently — no error frame is
/// ever sent back to the client, matching the session's own failure
/// semantics — they are only logged here for operator visibility.
async fn handle_connection(stream: TcpStream, opener: RedbCatalogOpener, max_frame_length: u32) {
    let _ = stream.set_nodelay(true);
    let mut io = FrameIo::with_max_frame_length(stream, max_frame_length);
    let mut session = Session::new(opener);

    loop {
        let frame = match io.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "frame I/O error, closing connection");
                break;
            },
        };

        let mut body = frame;
        let message = match Message::decode(&mut body) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "codec error, closing connection");
                break;
            },
        };

        match session.handle(message) {
            Ok(Some(reply)) => {
                let mut out = BytesMut::new();
                reply.encode(&mut out);
                if let Err(err) = io.send(&out).await {
                    tracing::debug!(error = %err, "send failed, closing connection");
                    break;
                }
            },
            Ok(None) => {},
            Err(err) => {
                tracing::debug!(error = %err, "session terminated");
                break;
            },
        }
    }

    if let Err(err) = session.close() {
        tracing::warn!(error = %err, "index close failed during connection teardown");
    }
}
