// src/main.rs
use case_picking::api;
use case_picking::config::AppConfig;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = dotenv {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let packing_config = app_config.packing.packing_config();

    info!("🚀 Case picking service starting...");
    if let Err(err) = api::start_api_server(app_config.api, app_config.solver, packing_config).await {
        error!("❌ API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
