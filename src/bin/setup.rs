use std::env;

use anyhow::{anyhow, Context, Result};

use diecast_tracker::{config::AppConfig, db, seed};

const USAGE: &str = "Usage: setup <migrate|seed|all>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    diecast_tracker::init_tracing();

    let command = env::args().nth(1);
    let (migrate, seed_brands) = match command.as_deref() {
        Some("migrate") => (true, false),
        Some("seed") => (false, true),
        Some("all") | None => (true, true),
        Some(other) => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "setup",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to get database connection: {err}"))?;

        if migrate {
            let applied = db::run_migrations(&mut conn)?;
            tracing::info!(count = applied.len(), migrations = ?applied, "migrations complete");
        }
        if seed_brands {
            let inserted = seed::seed_brands(&mut conn)?;
            tracing::info!(inserted, total = seed::DEFAULT_BRANDS.len(), "brands seeded");
        }
        Ok(())
    })
    .await
    .context("setup task panicked")??;

    tracing::info!("database setup complete");
    Ok(())
}
