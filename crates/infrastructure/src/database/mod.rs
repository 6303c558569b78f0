pub mod migrations;
pub mod postgres;

use std::time::Duration;

use pipeline_core::config::DatabaseConfig;
use pipeline_core::PipelineResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub use postgres::{
    PostgresExperimentRepository, PostgresJobRepository, PostgresPipelineRepository,
    PostgresReferenceRepository, PostgresRunRepository,
};

/// Connection pool manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> PipelineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "Database pool connected"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates missing tables and indexes. Safe to run on every start-up.
    pub async fn migrate(&self) -> PipelineResult<()> {
        migrations::run(&self.pool).await
    }

    pub async fn health_check(&self) -> PipelineResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn experiment_repository(&self) -> PostgresExperimentRepository {
        PostgresExperimentRepository::new(self.pool.clone())
    }

    pub fn pipeline_repository(&self) -> PostgresPipelineRepository {
        PostgresPipelineRepository::new(self.pool.clone())
    }

    pub fn job_repository(&self) -> PostgresJobRepository {
        PostgresJobRepository::new(self.pool.clone())
    }

    pub fn run_repository(&self) -> PostgresRunRepository {
        PostgresRunRepository::new(self.pool.clone())
    }

    pub fn reference_repository(&self) -> PostgresReferenceRepository {
        PostgresReferenceRepository::new(self.pool.clone())
    }
}
