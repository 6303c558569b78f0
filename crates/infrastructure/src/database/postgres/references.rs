use async_trait::async_trait;
use pipeline_core::PipelineResult;
use pipeline_domain::{ResourceReference, ResourceReferenceRepository, ResourceType};
use sqlx::PgPool;

use super::{row_to_reference, REFERENCE_COLUMNS};

pub struct PostgresReferenceRepository {
    pool: PgPool,
}

impl PostgresReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceReferenceRepository for PostgresReferenceRepository {
    async fn get(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        reference_type: ResourceType,
    ) -> PipelineResult<Option<ResourceReference>> {
        let row = sqlx::query(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM resource_references \
             WHERE resource_id = $1 AND resource_type = $2 AND reference_type = $3"
        ))
        .bind(resource_id)
        .bind(resource_type.as_str())
        .bind(reference_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_reference).transpose()
    }
}
