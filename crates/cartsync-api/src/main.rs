mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use cartsync_core::db::Database;
use cartsync_core::services::SyncService;
use cartsync_core::storage::{BlobStore, MemoryBlobStore, S3BlobStore, S3Config};
use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cartsync_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting cartsync-api with config: {:?}", config);

    let db = Database::open(&config.database_path).await?;
    let blobs: Arc<dyn BlobStore> = match S3Config::from_env()? {
        Some(s3_config) => {
            let store = S3BlobStore::new(s3_config);
            store.bucket_is_reachable().await?;
            tracing::info!(bucket = %store.config().bucket, "Using S3 blob storage");
            Arc::new(store)
        }
        None => {
            tracing::warn!("No S3 configuration found; save bytes are held in memory only");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let service = SyncService::new(db, blobs);
    let state = AppState::new(config.clone(), service);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("cartsync-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
