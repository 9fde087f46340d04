//! Ziva.pdf - Entry point
//!
//! Usage: `ziva-pdf [RESOURCE_DIR]...`. With resource directories given, file
//! sources and output paths are confined to them. Set `ZIVA_IDENTITY_API_KEY`
//! to enable sign-in.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ziva_pdf::{run_server_with_config, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP stream, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ziva_pdf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let resource_dirs: Vec<String> = std::env::args().skip(1).collect();
    let identity_api_key = std::env::var("ZIVA_IDENTITY_API_KEY")
        .ok()
        .filter(|key| !key.is_empty());

    tracing::info!(
        resource_dirs = ?resource_dirs,
        identity = identity_api_key.is_some(),
        "Starting Ziva.pdf server"
    );

    run_server_with_config(ServerConfig {
        resource_dirs,
        identity_api_key,
        ..ServerConfig::default()
    })
    .await
}
