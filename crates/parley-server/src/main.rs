//! # parley-server
//!
//! Realtime chat relay.
//!
//! This binary provides:
//! - **WebSocket gateway** where every client connects under an address taken
//!   from the request path and receives the messages routed to it
//! - **Message router** that forwards each chat payload to the connection
//!   named by its `address` field and stores a copy
//! - **REST API** (axum) for sending messages, reading the history, and
//!   uploading/downloading images
//! - **Streaming downloads** that read stored files only as fast as the
//!   client consumes them

mod api;
mod config;
mod error;
mod gateway;
mod pipeline;
mod registry;
mod router;
mod uploads;

use std::sync::Arc;

use parley_store::{Database, StoreGateway};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::gateway::GatewayState;
use crate::registry::ChannelRegistry;
use crate::router::MessageRouter;
use crate::uploads::UploadStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley chat relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Document store on its own blocking thread
    let database = Database::open_at(&config.database_path)?;
    let store = StoreGateway::spawn(database);

    // Upload directory (created if missing)
    let uploads = Arc::new(UploadStore::new(config.upload_dir.clone()).await?);

    let registry = ChannelRegistry::new(config.channel_capacity);

    let router = MessageRouter::new(
        registry.clone(),
        store.clone(),
        config.topics.clone(),
        config.malformed_policy,
    )
    .spawn();

    let gateway_state = GatewayState {
        registry: registry.clone(),
        router: router.clone(),
    };

    let ws_addr = config.ws_addr;
    let http_addr = config.http_addr;

    let app_state = AppState {
        store,
        router,
        registry,
        uploads,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run both listeners until one fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = gateway::serve(gateway_state, ws_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "WebSocket gateway failed");
                return Err(e);
            }
        }
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
