//! fcatalog server binary.
//!
//! # Usage
//!
//! ```bash
//! fcatalog-server --bind 0.0.0.0:7867 --db-base-path ./fcatalog-data --num-hashes 16
//! ```

use std::path::PathBuf;

use clap::Parser;
use fcatalog_server::{DEFAULT_MAX_CONNECTIONS, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// fcatalog function-similarity server
#[derive(Parser, Debug)]
#[command(name = "fcatalog-server")]
#[command(about = "Serves per-catalog reversed-function similarity queries")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7867")]
    bind: String,

    /// Directory under which each catalog's on-disk file is stored
    #[arg(long, default_value = "./fcatalog-data")]
    db_base_path: PathBuf,

    /// Number of permutations in a signature (fixed per deployment)
    #[arg(long, default_value = "16")]
    num_hashes: u32,

    /// Maximum accepted frame length, in bytes
    #[arg(long, default_value_t = fcatalog_proto::DEFAULT_MAX_FRAME_LENGTH)]
    max_frame_length: u32,

    /// Maximum number of simultaneously active connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("fcatalog server starting");

    let config = ServerConfig {
        bind_address: args.bind,
        db_base_path: args.db_base_path,
        num_hashes: args.num_hashes,
        max_frame_length: args.max_frame_length,
        max_connections: args.max_connections,
    };

    let server = Server::bind(config).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.run().await?;

    Ok(())
}
