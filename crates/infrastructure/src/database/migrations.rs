//! Idempotent schema set-up for the entity stores.

use pipeline_core::PipelineResult;
use sqlx::PgPool;
use tracing::{debug, info};

/// Applied in order; every statement is a no-op when already applied.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS experiments (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        namespace TEXT NOT NULL DEFAULT '',
        created_at BIGINT NOT NULL,
        storage_state TEXT NOT NULL DEFAULT 'STORAGESTATE_AVAILABLE',
        UNIQUE (name, namespace)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS default_experiments (
        singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
        experiment_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pipelines (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        namespace TEXT NOT NULL DEFAULT '',
        parameters TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        default_version_id TEXT,
        created_at BIGINT NOT NULL,
        UNIQUE (name, namespace)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_versions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        pipeline_id TEXT NOT NULL REFERENCES pipelines (id) ON DELETE CASCADE,
        parameters TEXT NOT NULL DEFAULT '[]',
        code_source_url TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        UNIQUE (pipeline_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        name TEXT NOT NULL,
        namespace TEXT NOT NULL DEFAULT '',
        service_account TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        max_concurrency BIGINT NOT NULL DEFAULT 1,
        no_catchup BOOLEAN NOT NULL DEFAULT FALSE,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        trigger JSONB NOT NULL,
        conditions TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        pipeline_id TEXT NOT NULL DEFAULT '',
        pipeline_name TEXT NOT NULL DEFAULT '',
        workflow_spec_manifest TEXT NOT NULL DEFAULT '',
        parameters TEXT NOT NULL DEFAULT '',
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        experiment_id TEXT NOT NULL DEFAULT '',
        display_name TEXT NOT NULL,
        name TEXT NOT NULL,
        storage_state TEXT NOT NULL DEFAULT 'STORAGESTATE_AVAILABLE',
        namespace TEXT NOT NULL DEFAULT '',
        service_account TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        created_at BIGINT NOT NULL,
        scheduled_at BIGINT NOT NULL DEFAULT 0,
        finished_at BIGINT NOT NULL DEFAULT 0,
        conditions TEXT NOT NULL DEFAULT '',
        pipeline_id TEXT NOT NULL DEFAULT '',
        pipeline_name TEXT NOT NULL DEFAULT '',
        workflow_spec_manifest TEXT NOT NULL DEFAULT '',
        parameters TEXT NOT NULL DEFAULT '',
        workflow_runtime_manifest TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_references (
        resource_id TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        reference_id TEXT NOT NULL,
        reference_name TEXT NOT NULL DEFAULT '',
        reference_type TEXT NOT NULL,
        relationship TEXT NOT NULL,
        PRIMARY KEY (resource_id, resource_type, reference_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS run_metrics (
        run_id TEXT NOT NULL REFERENCES runs (id) ON DELETE CASCADE,
        node_id TEXT NOT NULL,
        name TEXT NOT NULL,
        number_value DOUBLE PRECISION NOT NULL,
        format TEXT NOT NULL DEFAULT 'RAW',
        PRIMARY KEY (run_id, node_id, name)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_runs_experiment ON runs (experiment_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_runs_namespace ON runs (namespace, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_namespace ON jobs (namespace, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_references_target ON resource_references (reference_type, reference_id)",
];

pub async fn run(pool: &PgPool) -> PipelineResult<()> {
    let mut tx = pool.begin().await?;
    for (index, statement) in SCHEMA.iter().enumerate() {
        debug!(step = index, "Applying schema statement");
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!(statements = SCHEMA.len(), "Database schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_statement_is_idempotent() {
        for statement in SCHEMA {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "statement would fail on re-run: {statement}"
            );
        }
    }

    #[test]
    fn test_child_tables_follow_their_parents() {
        let position = |needle: &str| SCHEMA.iter().position(|s| s.contains(needle)).unwrap();
        assert!(
            position("CREATE TABLE IF NOT EXISTS pipelines")
                < position("CREATE TABLE IF NOT EXISTS pipeline_versions")
        );
        assert!(
            position("CREATE TABLE IF NOT EXISTS runs")
                < position("CREATE TABLE IF NOT EXISTS run_metrics")
        );
    }
}
