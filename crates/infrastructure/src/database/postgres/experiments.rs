use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::{
    DefaultExperimentRepository, Experiment, ExperimentRepository, FilterContext, ListOptions,
    ListPage, ResourceType, StorageState,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use super::{expect_row, insert_error, page, parse_column, push_order_and_page};

const COLUMNS: &str = "id, name, description, namespace, created_at, storage_state";

pub struct PostgresExperimentRepository {
    pool: PgPool,
}

impl PostgresExperimentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_experiment(row: &PgRow) -> PipelineResult<Experiment> {
        Ok(Experiment {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            namespace: row.try_get("namespace")?,
            created_at: row.try_get("created_at")?,
            storage_state: parse_column(row, "storage_state")?,
        })
    }

    fn filtered(select: &str, filter: &FilterContext) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("{select} FROM experiments WHERE TRUE"));
        if let Some(key) = &filter.reference_key {
            if key.resource_type == ResourceType::Namespace {
                qb.push(" AND namespace = ");
                qb.push_bind(key.id.clone());
            }
        }
        qb
    }

    async fn set_storage_state(&self, id: &str, state: StorageState) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE experiments SET storage_state = $2 WHERE id = $1")
            .bind(id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "experiment", id)
    }
}

#[async_trait]
impl ExperimentRepository for PostgresExperimentRepository {
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id, namespace = %experiment.namespace))]
    async fn create(&self, experiment: &Experiment) -> PipelineResult<Experiment> {
        let row = sqlx::query(&format!(
            "INSERT INTO experiments ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(&experiment.id)
        .bind(&experiment.name)
        .bind(&experiment.description)
        .bind(&experiment.namespace)
        .bind(experiment.created_at)
        .bind(experiment.storage_state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, "experiment", &experiment.name))?;
        Self::row_to_experiment(&row)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> PipelineResult<Option<Experiment>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM experiments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_experiment).transpose()
    }

    async fn get_by_name(&self, name: &str, namespace: &str) -> PipelineResult<Option<Experiment>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM experiments WHERE name = $1 AND namespace = $2"
        ))
        .bind(name)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_experiment).transpose()
    }

    async fn list(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Experiment>> {
        let total = Self::filtered("SELECT COUNT(*)", filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = Self::filtered(&format!("SELECT {COLUMNS}"), filter);
        push_order_and_page(&mut qb, opts)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_experiment)
            .collect::<PipelineResult<Vec<_>>>()?;
        debug!(count = items.len(), total, "Listed experiments");
        page(items, total, opts)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM experiments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        expect_row(result, "experiment", id)?;
        sqlx::query("DELETE FROM default_experiments WHERE experiment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Archives the experiment together with its runs and disables its jobs'
    /// rows in one transaction.
    #[instrument(skip(self))]
    async fn archive(&self, id: &str) -> PipelineResult<()> {
        let archived = StorageState::Archived.as_str();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE experiments SET storage_state = $2 WHERE id = $1")
            .bind(id)
            .bind(archived)
            .execute(&mut *tx)
            .await?;
        expect_row(result, "experiment", id)?;

        sqlx::query("UPDATE runs SET storage_state = $2 WHERE experiment_id = $1")
            .bind(id)
            .bind(archived)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE jobs SET enabled = FALSE WHERE id IN (\
             SELECT resource_id FROM resource_references \
             WHERE resource_type = 'Job' AND reference_type = 'Experiment' AND reference_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unarchive(&self, id: &str) -> PipelineResult<()> {
        self.set_storage_state(id, StorageState::Available).await
    }
}

#[async_trait]
impl DefaultExperimentRepository for PostgresExperimentRepository {
    async fn get_default_experiment_id(&self) -> PipelineResult<Option<String>> {
        let id: Option<String> = sqlx::query_scalar("SELECT experiment_id FROM default_experiments")
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn set_default_experiment_id_if_absent(&self, id: &str) -> PipelineResult<String> {
        sqlx::query(
            "INSERT INTO default_experiments (singleton, experiment_id) VALUES (TRUE, $1) \
             ON CONFLICT (singleton) DO NOTHING",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        let stored: String = sqlx::query_scalar("SELECT experiment_id FROM default_experiments")
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }
}
