use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod batch;
mod catalog;
mod config;
mod error;
mod gemini;
mod mime_type;
mod pipeline;
mod poller;
mod progress;
mod service;
mod staging;
mod store;
#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::service::FileSearchService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting file search service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Optional config file, then environment; fails fast on a missing credential
    let config = AppConfig::load()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.gemini.model,
        store = %config.gemini.store_display_name,
        "Configuration loaded"
    );

    if let Some(temp_dir) = &config.storage.temp_dir {
        std::fs::create_dir_all(temp_dir)?;
    }

    let client = Arc::new(GeminiClient::new(config.gemini.clone())?);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let service = Arc::new(FileSearchService::new(client, config));
    let app = api::router(service);

    // Start the server
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("file_search_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
