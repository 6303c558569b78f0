use async_trait::async_trait;
use pipeline_core::constants::RUN_CONDITION_TERMINATING;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    FilterContext, ListOptions, ListPage, PipelineSpecRecord, ResourceType, Run, RunMetric,
    RunRepository, StorageState,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use super::{
    delete_references, expect_row, insert_error, insert_references, load_references, page,
    parse_column, push_order_and_page, push_reference_filter,
};

const COLUMNS: &str = "id, experiment_id, display_name, name, storage_state, namespace, \
     service_account, description, created_at, scheduled_at, finished_at, conditions, \
     pipeline_id, pipeline_name, workflow_spec_manifest, parameters, workflow_runtime_manifest";

/// Conditions from which a run can still be terminated.
const ACTIVE_CONDITIONS: [&str; 3] = ["", "Running", "Pending"];

pub struct PostgresRunRepository {
    pool: PgPool,
}

impl PostgresRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_run(row: &PgRow) -> PipelineResult<Run> {
        Ok(Run {
            id: row.try_get("id")?,
            experiment_id: row.try_get("experiment_id")?,
            display_name: row.try_get("display_name")?,
            name: row.try_get("name")?,
            storage_state: parse_column(row, "storage_state")?,
            namespace: row.try_get("namespace")?,
            service_account: row.try_get("service_account")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            finished_at: row.try_get("finished_at")?,
            conditions: row.try_get("conditions")?,
            pipeline_spec: PipelineSpecRecord {
                pipeline_id: row.try_get("pipeline_id")?,
                pipeline_name: row.try_get("pipeline_name")?,
                workflow_spec_manifest: row.try_get("workflow_spec_manifest")?,
                parameters: row.try_get("parameters")?,
            },
            workflow_runtime_manifest: row.try_get("workflow_runtime_manifest")?,
            resource_references: Vec::new(),
        })
    }

    fn filtered(select: &str, filter: &FilterContext) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("{select} FROM runs WHERE TRUE"));
        match &filter.reference_key {
            Some(key) if key.resource_type == ResourceType::Namespace => {
                qb.push(" AND namespace = ");
                qb.push_bind(key.id.clone());
            }
            Some(key) if key.resource_type == ResourceType::Experiment => {
                qb.push(" AND experiment_id = ");
                qb.push_bind(key.id.clone());
            }
            Some(key) => push_reference_filter(&mut qb, "runs", ResourceType::Run, key),
            None => {}
        }
        qb
    }

    async fn with_references(&self, mut runs: Vec<Run>) -> PipelineResult<Vec<Run>> {
        let ids: Vec<String> = runs.iter().map(|r| r.id.clone()).collect();
        let mut references = load_references(&self.pool, ResourceType::Run, &ids).await?;
        for run in &mut runs {
            run.resource_references = references.remove(&run.id).unwrap_or_default();
        }
        Ok(runs)
    }

    async fn insert(&self, run: &Run, upsert: bool) -> PipelineResult<()> {
        let conflict = if upsert {
            " ON CONFLICT (id) DO UPDATE SET conditions = EXCLUDED.conditions, \
             finished_at = EXCLUDED.finished_at, \
             workflow_runtime_manifest = EXCLUDED.workflow_runtime_manifest"
        } else {
            ""
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO runs ({COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17){conflict}"
        ))
        .bind(&run.id)
        .bind(&run.experiment_id)
        .bind(&run.display_name)
        .bind(&run.name)
        .bind(run.storage_state.as_str())
        .bind(&run.namespace)
        .bind(&run.service_account)
        .bind(&run.description)
        .bind(run.created_at)
        .bind(run.scheduled_at)
        .bind(run.finished_at)
        .bind(&run.conditions)
        .bind(&run.pipeline_spec.pipeline_id)
        .bind(&run.pipeline_spec.pipeline_name)
        .bind(&run.pipeline_spec.workflow_spec_manifest)
        .bind(&run.pipeline_spec.parameters)
        .bind(&run.workflow_runtime_manifest)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "run", &run.id))?;
        insert_references(&mut tx, &run.resource_references).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_storage_state(&self, id: &str, state: StorageState) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE runs SET storage_state = $2 WHERE id = $1")
            .bind(id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "run", id)
    }
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    #[instrument(skip(self, run), fields(run_id = %run.id, namespace = %run.namespace))]
    async fn create(&self, run: &Run) -> PipelineResult<Run> {
        self.insert(run, false).await?;
        debug!(run_id = %run.id, "Run row created");
        Ok(run.clone())
    }

    async fn get(&self, id: &str) -> PipelineResult<Option<Run>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM runs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let run = Self::row_to_run(&row)?;
        Ok(self.with_references(vec![run]).await?.pop())
    }

    async fn list(&self, filter: &FilterContext, opts: &ListOptions) -> PipelineResult<ListPage<Run>> {
        let total = Self::filtered("SELECT COUNT(*)", filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        let mut qb = Self::filtered(&format!("SELECT {COLUMNS}"), filter);
        push_order_and_page(&mut qb, opts)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        let runs = rows
            .iter()
            .map(Self::row_to_run)
            .collect::<PipelineResult<Vec<_>>>()?;
        page(self.with_references(runs).await?, total, opts)
    }

    #[instrument(skip(self, runtime_manifest))]
    async fn update(
        &self,
        id: &str,
        condition: &str,
        finished_at: i64,
        runtime_manifest: &str,
    ) -> PipelineResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET conditions = $2, finished_at = $3, workflow_runtime_manifest = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(condition)
        .bind(finished_at)
        .bind(runtime_manifest)
        .execute(&self.pool)
        .await?;
        expect_row(result, "run", id)
    }

    #[instrument(skip(self, run), fields(run_id = %run.id))]
    async fn create_or_update(&self, run: &Run) -> PipelineResult<()> {
        self.insert(run, true).await
    }

    async fn archive(&self, id: &str) -> PipelineResult<()> {
        self.set_storage_state(id, StorageState::Archived).await
    }

    async fn unarchive(&self, id: &str) -> PipelineResult<()> {
        self.set_storage_state(id, StorageState::Available).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM runs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        expect_row(result, "run", id)?;
        delete_references(&mut tx, id, ResourceType::Run).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Only flips runs that have not finished; the check and the write are
    /// one statement.
    #[instrument(skip(self))]
    async fn terminate(&self, id: &str) -> PipelineResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET conditions = $2 WHERE id = $1 AND conditions = ANY($3)",
        )
        .bind(id)
        .bind(RUN_CONDITION_TERMINATING)
        .bind(&ACTIVE_CONDITIONS[..])
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let condition: Option<String> =
            sqlx::query_scalar("SELECT conditions FROM runs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match condition {
            None => Err(PipelineError::not_found("run", id)),
            Some(condition) => Err(PipelineError::BadRequest(format!(
                "Run {id} is not running (condition {condition})"
            ))),
        }
    }

    async fn report_metric(&self, metric: &RunMetric) -> PipelineResult<()> {
        sqlx::query(
            "INSERT INTO run_metrics (run_id, node_id, name, number_value, format) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&metric.run_id)
        .bind(&metric.node_id)
        .bind(&metric.name)
        .bind(metric.number_value)
        .bind(&metric.format)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            insert_error(
                e,
                "run metric",
                &format!("{}/{}/{}", metric.run_id, metric.node_id, metric.name),
            )
        })?;
        Ok(())
    }
}
