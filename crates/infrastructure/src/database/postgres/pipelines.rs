use async_trait::async_trait;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    FilterContext, ListOptions, ListPage, Pipeline, PipelineRepository, PipelineStatus,
    PipelineVersion, ResourceType,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use super::{expect_row, insert_error, page, parse_column, push_order_and_page};

const PIPELINE_COLUMNS: &str =
    "id, name, description, namespace, parameters, status, default_version_id, created_at";
const VERSION_COLUMNS: &str =
    "id, name, pipeline_id, parameters, code_source_url, status, created_at";

pub struct PostgresPipelineRepository {
    pool: PgPool,
}

impl PostgresPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_pipeline(row: &PgRow) -> PipelineResult<Pipeline> {
        Ok(Pipeline {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            namespace: row.try_get("namespace")?,
            parameters: row.try_get("parameters")?,
            status: parse_column(row, "status")?,
            default_version_id: row.try_get("default_version_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_version(row: &PgRow) -> PipelineResult<PipelineVersion> {
        Ok(PipelineVersion {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            pipeline_id: row.try_get("pipeline_id")?,
            parameters: row.try_get("parameters")?,
            code_source_url: row.try_get("code_source_url")?,
            status: parse_column(row, "status")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn ready_pipelines(select: &str, filter: &FilterContext) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("{select} FROM pipelines WHERE status = "));
        qb.push_bind(PipelineStatus::Ready.as_str());
        if let Some(key) = &filter.reference_key {
            if key.resource_type == ResourceType::Namespace {
                qb.push(" AND namespace = ");
                qb.push_bind(key.id.clone());
            }
        }
        qb
    }

    fn ready_versions(select: &str, pipeline_id: &str) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!(
            "{select} FROM pipeline_versions WHERE pipeline_id = "
        ));
        qb.push_bind(pipeline_id.to_string());
        qb.push(" AND status = ");
        qb.push_bind(PipelineStatus::Ready.as_str());
        qb
    }
}

#[async_trait]
impl PipelineRepository for PostgresPipelineRepository {
    #[instrument(skip(self, pipeline, version), fields(pipeline_id = %pipeline.id, namespace = %pipeline.namespace))]
    async fn create_pipeline(
        &self,
        pipeline: &Pipeline,
        version: &PipelineVersion,
    ) -> PipelineResult<Pipeline> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO pipelines ({PIPELINE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {PIPELINE_COLUMNS}"
        ))
        .bind(&pipeline.id)
        .bind(&pipeline.name)
        .bind(&pipeline.description)
        .bind(&pipeline.namespace)
        .bind(&pipeline.parameters)
        .bind(pipeline.status.as_str())
        .bind(&pipeline.default_version_id)
        .bind(pipeline.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "pipeline", &pipeline.name))?;

        sqlx::query(&format!(
            "INSERT INTO pipeline_versions ({VERSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(&version.id)
        .bind(&version.name)
        .bind(&version.pipeline_id)
        .bind(&version.parameters)
        .bind(&version.code_source_url)
        .bind(version.status.as_str())
        .bind(version.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "pipeline version", &version.name))?;
        tx.commit().await?;
        Self::row_to_pipeline(&row)
    }

    async fn get_pipeline(&self, id: &str) -> PipelineResult<Option<Pipeline>> {
        let row = sqlx::query(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1 AND status = $2"
        ))
        .bind(id)
        .bind(PipelineStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_pipeline).transpose()
    }

    async fn list_pipelines(
        &self,
        filter: &FilterContext,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<Pipeline>> {
        let total = Self::ready_pipelines("SELECT COUNT(*)", filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        let mut qb = Self::ready_pipelines(&format!("SELECT {PIPELINE_COLUMNS}"), filter);
        push_order_and_page(&mut qb, opts)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_pipeline)
            .collect::<PipelineResult<Vec<_>>>()?;
        page(items, total, opts)
    }

    /// Versions go with the pipeline through the foreign-key cascade.
    #[instrument(skip(self))]
    async fn delete_pipeline(&self, id: &str) -> PipelineResult<()> {
        let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_row(result, "pipeline", id)
    }

    async fn update_pipeline_status(&self, id: &str, status: PipelineStatus) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE pipelines SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "pipeline", id)
    }

    async fn update_pipeline_default_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE pipelines SET default_version_id = $2 WHERE id = $1")
            .bind(pipeline_id)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        expect_row(result, "pipeline", pipeline_id)
    }

    #[instrument(skip(self, version), fields(pipeline_id = %version.pipeline_id, version_id = %version.id))]
    async fn create_pipeline_version(
        &self,
        version: &PipelineVersion,
        update_default: bool,
    ) -> PipelineResult<PipelineVersion> {
        let mut tx = self.pool.begin().await?;
        let owner_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pipelines WHERE id = $1)")
                .bind(&version.pipeline_id)
                .fetch_one(&mut *tx)
                .await?;
        if !owner_exists {
            return Err(PipelineError::not_found("pipeline", &version.pipeline_id));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO pipeline_versions ({VERSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {VERSION_COLUMNS}"
        ))
        .bind(&version.id)
        .bind(&version.name)
        .bind(&version.pipeline_id)
        .bind(&version.parameters)
        .bind(&version.code_source_url)
        .bind(version.status.as_str())
        .bind(version.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "pipeline version", &version.name))?;

        if update_default {
            sqlx::query("UPDATE pipelines SET default_version_id = $2 WHERE id = $1")
                .bind(&version.pipeline_id)
                .bind(&version.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Self::row_to_version(&row)
    }

    async fn get_pipeline_version(&self, id: &str) -> PipelineResult<Option<PipelineVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM pipeline_versions WHERE id = $1 AND status = $2"
        ))
        .bind(id)
        .bind(PipelineStatus::Ready.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_version).transpose()
    }

    async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
        opts: &ListOptions,
    ) -> PipelineResult<ListPage<PipelineVersion>> {
        let total = Self::ready_versions("SELECT COUNT(*)", pipeline_id)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        let mut qb = Self::ready_versions(&format!("SELECT {VERSION_COLUMNS}"), pipeline_id);
        push_order_and_page(&mut qb, opts)?;
        let rows = qb.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_version)
            .collect::<PipelineResult<Vec<_>>>()?;
        page(items, total, opts)
    }

    async fn delete_pipeline_version(&self, id: &str) -> PipelineResult<()> {
        let result = sqlx::query("DELETE FROM pipeline_versions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_row(result, "pipeline version", id)
    }

    async fn update_pipeline_version_status(
        &self,
        id: &str,
        status: PipelineStatus,
    ) -> PipelineResult<()> {
        let result = sqlx::query("UPDATE pipeline_versions SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        expect_row(result, "pipeline version", id)
    }
}
