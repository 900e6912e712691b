mod config;
mod models;
mod routes;
mod storage;

use axum::{Router, extract::DefaultBodyLimit};
use config::ServiceConfig;
use routes::AppState;
use storage::RunStorage;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dslpipe=debug,dslpipe_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;
    tracing::debug!("Configuration: {:?}", config);

    let storage = RunStorage::new(&config.data_dir)?;
    let state = AppState {
        storage: Arc::new(storage),
        run_defaults: Arc::new(config.run_defaults.clone()),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Record batches carry whole file contents
    let app = Router::new()
        .merge(routes::create_routes(state))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(cors);

    tracing::info!("Starting dslpipe service on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
