//! flyfile server binary: publishes the configured share over HTTP.

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use flyfile::catalog::FileCatalog;
use flyfile::config::ShareConfig;
use flyfile::error::{Result, ShareError};
use flyfile::router::{router, ShareState};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        ShareConfig::from_file(&config_path)?
    } else {
        tracing::warn!("no config file at {config_path}, using defaults");
        ShareConfig::default()
    };

    if config.share.name.is_empty() {
        return Err(ShareError::Config("share name not given".to_string()));
    }

    let catalog = FileCatalog::build(&config.share.files).await?;
    if catalog.is_empty() {
        tracing::warn!("share list is empty, only the client pages will be served");
    }
    for file in catalog.list() {
        tracing::info!(name = %file.name, size = file.size, media_type = %file.media_type, "sharing");
    }

    let state = Arc::new(ShareState {
        catalog,
        assets: config.share.assets.clone(),
    });
    let app = router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(share = %config.share.name, %addr, "share published");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flyfile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
