use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod routes;
mod store;

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let db = store::connect(&config.database_url, 5).await?;
    let params = store::init_db(&db).await?;
    info!(
        server_seed_hash = %params.server_seed_hash,
        sequence = params.sequence,
        "loaded server seed"
    );

    let state = Arc::new(routes::build_state(db, &config, params).await?);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
