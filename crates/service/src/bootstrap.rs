use ksm_core::config::{AppConfig, ConfigError, LoadOptions};
use ksm_db::{connect_from_config, migrations, DbPool, ProcurementRepositories};
use thiserror::Error;
use tracing::info;

use crate::service::ProcurementService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: ProcurementService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Loads config, opens the database, applies pending migrations and wires the service.
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let service = ProcurementService::new(ProcurementRepositories::sql(db_pool.clone()))
        .with_report_top_n(config.analysis.report_top_n);

    Ok(Application { config, db_pool, service })
}
