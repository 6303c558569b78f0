use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::{
    FilterContext, Job, JobRepository, JobStatus, ListOptions, ListPage, PipelineSpecRecord,
    ResourceType, Trigger,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use super::{
    delete_references, expect_row, insert_error, insert_references, load_references, page,
    parse_column, push_order_and_page, push_reference_filter,
};

const COLUMNS: &str = "id, display_name, name, namespace, service_account, description, \
     max_concurrency, no_catchup, enabled, trigger, conditions, status, pipeline_id, \
     pipeline_name, workflow_spec_manifest, parameters, created_at, updated_at";

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Row without its references; callers attach them.
    fn row_to_job(row: &PgRow) -> PipelineResult<Job> {
        let Json(trigger): Json<Trigger> = row.try_get("trigger")?;
        Ok(Job {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            name: row.try_get("name")?,
            namespace: row.try_get("namespace")?,
            service_account: row.try_get("service_account")?,
            description: row.try_get("description")?,
            max_concurrency: row.try_get("max_concurrency")?,
            no_catchup: row.try_get("no_catchup")?,
            enabled: row.try_get("enabled")?,
            trigger,
            conditions: row.try_get("conditions")?,
            status: parse_column(row, "status")?,
            pipeline_spec: PipelineSpecRecord {
                pipeline_id: row.try_get("pipeline_id")?,
                pipeline_name: row.try_get("pipeline_name")?,
                workflow_spec_manifest: row.try_get("workflow_spec_manifest")?,
                parameters: row.try_get("parameters")?,
            },
            resource_references: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn ready_jobs(select: &str, filter: &FilterContext) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("{select} FROM jobs WHERE status = "));
        qb.push_bind(JobStatus::Ready.as_str());
        match &filter.reference_key {
            Some(key) if key.resource_type == ResourceType::Namespace => {
                qb.push(" AND namespace = ");
                qb.push_bind(key.id.clone());
            }
            Some(key) => push_reference_filter(&mut qb, "jobs", ResourceType::Job, key),
            None => {}
        }
        qb
    }

    async fn with_references(&self, mut jobs: Vec<Job>) -> PipelineResult<Vec<Job>> {
        let ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
        let mut references = load_references(&self.pool, ResourceType::Job, &ids).await?;
        for job in &mut jobs {
            job.resource_references = references.remove(&job.id).unwrap_or_default();
        }
        Ok(jobs)
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id, namespace = %job.namespace))]
    async fn create(&self, job: &Job) -> PipelineResult<Job> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO jobs ({COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(&job.id)
        .bind(&job.display_name)
        .bind(&job.name)
        .bind(&job.namespace)
        .bind(&job.service_account)
        .bind(&job.description)
        .bind(job.max_concurrency)
        .bind(job.no_catchup)
        .bind(job.enabled)
        .bind(Json(&job.trigger))
        .bind(&job.conditions)
        .bind(job.status.as_str())
        .bind(&job.pipeline_spec.pipeline_id)
        .bind(&job.pipeline_spec.pipeline_name)
        .bind(&job.pipeline_spec.workflow_spec_manifest)
        .bind(&job.pipeline_spec.parameters)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "job", &job.id))?;
        insert_references(&mut tx, &job.resource_references).await?;
        tx.commit().await?;
        debug!(job_id = %job.id, "Job row created");
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> PipelineResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND status = $2"))
            .bind(id)
            .bind(JobStatus::Ready.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let job = Self::row_to_job(&row)?;
        Ok(self.with_references(vec![job]).await?.pop())
    }

    async fn list(&self, filter: &FilterContext, opts: &ListOptions) -> PipelineResult<ListPage<Job>> {
        let total = Self::ready_jobs("SELECT COUNT(*)", filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        let mut qb = Self::ready_jobs(&format!("SELECT {COLUMNS}"), filter);
        push_order_and_page(&mut qb, opts)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        let jobs = rows
            .iter()
            .map(Self::row_to_job)
            .collect::<PipelineResult<Vec<_>>>()?;
        page(self.with_references(jobs).await?, total, opts)
    }

    async fn enable(&self, id: &str, enabled: bool, updated_at: i64) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE jobs SET enabled = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
        expect_row(result, "job", id)
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE jobs SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "job", id)
    }

    async fn update_from_report(&self, job: &Job) -> PipelineResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET enabled = $2, conditions = $3, trigger = $4, max_concurrency = $5, \
             no_catchup = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(&job.id)
        .bind(job.enabled)
        .bind(&job.conditions)
        .bind(Json(&job.trigger))
        .bind(job.max_concurrency)
        .bind(job.no_catchup)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        expect_row(result, "job", &job.id)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        delete_references(&mut tx, id, ResourceType::Job).await?;
        tx.commit().await?;
        Ok(())
    }
}
