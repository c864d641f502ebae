//! Inventory service entry point.

use api::config::{Config, Service};
use api::error::StartupError;
use inventory::{InMemoryProductStore, PostgresProductStore};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = Config::from_env(Service::Inventory);
    api::telemetry::init_tracing(&config.log_level);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "inventory service failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let metrics_handle = api::telemetry::install_metrics()?;
    let broker = api::connect_broker(&config).await?;

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresProductStore::new(pool);
            store.run_migrations().await?;
            api::server::run_inventory_service(&config, broker.clone(), store, metrics_handle)
                .await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, products are kept in memory");
            let store = InMemoryProductStore::new();
            api::server::run_inventory_service(&config, broker.clone(), store, metrics_handle)
                .await?;
        }
    }

    broker.close().await?;
    Ok(())
}
