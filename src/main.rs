use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal;

use diecast_tracker::config::AppConfig;
use diecast_tracker::db;
use diecast_tracker::images::ImageStore;
use diecast_tracker::routes;
use diecast_tracker::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    diecast_tracker::init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        storage_backend = config.storage.backend_name(),
        storage_bucket = %config.storage_bucket,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::migrate_pool(&pool).await?;
    if !applied.is_empty() {
        tracing::info!(migrations = ?applied, "applied pending migrations");
    }

    let images = ImageStore::from_config(&config).await;
    if !images.is_configured() {
        tracing::warn!("object storage not configured, image uploads will fail");
    }

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(pool, config, images);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;
    Ok(())
}
