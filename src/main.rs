use tracing_subscriber::{fmt, EnvFilter};
use tracing::info;

use feedgate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "feedgate",
        "feedgate starting: RUST_LOG='{}', http_port={}, secret_id='{}', secret_field='{}', secret_store={:?}",
        rust_log, config.http_port, config.jwt_secret_id, config.jwt_secret_field, config.secret_store
    );

    feedgate::server::run(config).await
}
