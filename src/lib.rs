pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod models;
pub mod response;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod seed;
pub mod state;
pub mod storage;
pub mod supabase;
pub mod utils;

use tracing_subscriber::EnvFilter;

/// Installs the compact `tracing` subscriber shared by the binaries.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
