//! Binary entrypoint for the sigtrace ingestion server.
//!
//! Configuration comes from `SIGTRACE_*` environment variables, see
//! [`ServerConfig::from_env`].

use sigtrace_server::{ServerConfig, ServerError, SignatureServer};
use sigtrace_storage::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = start().await {
        tracing::error!(error = %err, "sigtrace server failed to start");
        std::process::exit(1);
    }
}

async fn start() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;
    let store = SqliteStore::new(&config.db_path)?;
    tracing::info!(db = %config.db_path, addr = %config.listen_addr(), "sigtrace server starting");

    let server = SignatureServer::new(config, store);
    server.run_supervised().await;
    Ok(())
}
