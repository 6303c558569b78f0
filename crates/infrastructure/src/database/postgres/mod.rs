//! PostgreSQL implementations of the entity store traits.

mod experiments;
mod jobs;
mod pipelines;
mod references;
mod runs;

pub use experiments::PostgresExperimentRepository;
pub use jobs::PostgresJobRepository;
pub use pipelines::PostgresPipelineRepository;
pub use references::PostgresReferenceRepository;
pub use runs::PostgresRunRepository;

use std::collections::HashMap;

use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::{
    ListOptions, ListPage, ReferenceKey, ResourceReference, ResourceType,
};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

pub(crate) const REFERENCE_COLUMNS: &str =
    "resource_id, resource_type, reference_id, reference_name, reference_type, relationship";

/// Maps a unique-key violation to AlreadyExists; other failures stay
/// database errors.
pub(crate) fn insert_error(err: sqlx::Error, resource: &str, id: &str) -> PipelineError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PipelineError::already_exists(resource, id)
        }
        _ => PipelineError::Database(err),
    }
}

/// NotFound when a mutation touched no row.
pub(crate) fn expect_row(result: PgQueryResult, resource: &str, id: &str) -> PipelineResult<()> {
    if result.rows_affected() == 0 {
        return Err(PipelineError::not_found(resource, id));
    }
    Ok(())
}

pub(crate) fn parse_column<T>(row: &PgRow, column: &str) -> PipelineResult<T>
where
    T: std::str::FromStr<Err = PipelineError>,
{
    row.try_get::<String, _>(column)?.parse()
}

fn sort_column(sort_by: &str) -> PipelineResult<&'static str> {
    match sort_by {
        "" | "created_at" => Ok("created_at"),
        "name" => Ok("name"),
        "id" => Ok("id"),
        other => Err(PipelineError::invalid_input(format!(
            "Unsupported sort field: {other}"
        ))),
    }
}

/// Appends ORDER BY, LIMIT and OFFSET. The id tie-breaker keeps pages
/// stable when sort keys collide.
pub(crate) fn push_order_and_page(
    qb: &mut QueryBuilder<'_, Postgres>,
    opts: &ListOptions,
) -> PipelineResult<()> {
    let column = sort_column(&opts.sort_by)?;
    let direction = if opts.descending { "DESC" } else { "ASC" };
    qb.push(format!(" ORDER BY {column} {direction}, id {direction}"));
    qb.push(" LIMIT ");
    qb.push_bind(opts.page_size.max(1) as i64);
    qb.push(" OFFSET ");
    qb.push_bind(opts.offset()? as i64);
    Ok(())
}

/// Restricts `table` to rows carrying a reference to `key`.
pub(crate) fn push_reference_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: &str,
    resource_type: ResourceType,
    key: &ReferenceKey,
) {
    qb.push(format!(
        " AND EXISTS (SELECT 1 FROM resource_references r WHERE r.resource_id = {table}.id AND r.resource_type = "
    ));
    qb.push_bind(resource_type.as_str());
    qb.push(" AND r.reference_type = ");
    qb.push_bind(key.resource_type.as_str());
    qb.push(" AND r.reference_id = ");
    qb.push_bind(key.id.clone());
    qb.push(")");
}

pub(crate) fn page<T>(items: Vec<T>, total: i64, opts: &ListOptions) -> PipelineResult<ListPage<T>> {
    let total_size = usize::try_from(total).unwrap_or_default();
    let end = opts.offset()? + items.len();
    let next_page_token = (!items.is_empty() && end < total_size).then(|| end.to_string());
    Ok(ListPage {
        items,
        total_size,
        next_page_token,
    })
}

pub(crate) fn row_to_reference(row: &PgRow) -> PipelineResult<ResourceReference> {
    Ok(ResourceReference {
        resource_id: row.try_get("resource_id")?,
        resource_type: parse_column(row, "resource_type")?,
        reference_id: row.try_get("reference_id")?,
        reference_name: row.try_get("reference_name")?,
        reference_type: parse_column(row, "reference_type")?,
        relationship: parse_column(row, "relationship")?,
    })
}

/// Upserts the edges of one resource inside the caller's transaction.
pub(crate) async fn insert_references(
    conn: &mut PgConnection,
    references: &[ResourceReference],
) -> PipelineResult<()> {
    for reference in references {
        sqlx::query(&format!(
            "INSERT INTO resource_references ({REFERENCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (resource_id, resource_type, reference_type) DO UPDATE SET \
             reference_id = EXCLUDED.reference_id, reference_name = EXCLUDED.reference_name, \
             relationship = EXCLUDED.relationship"
        ))
        .bind(&reference.resource_id)
        .bind(reference.resource_type.as_str())
        .bind(&reference.reference_id)
        .bind(&reference.reference_name)
        .bind(reference.reference_type.as_str())
        .bind(reference.relationship.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) async fn delete_references(
    conn: &mut PgConnection,
    resource_id: &str,
    resource_type: ResourceType,
) -> PipelineResult<()> {
    sqlx::query("DELETE FROM resource_references WHERE resource_id = $1 AND resource_type = $2")
        .bind(resource_id)
        .bind(resource_type.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Edges of every listed resource, grouped by resource id.
pub(crate) async fn load_references(
    pool: &PgPool,
    resource_type: ResourceType,
    resource_ids: &[String],
) -> PipelineResult<HashMap<String, Vec<ResourceReference>>> {
    if resource_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(&format!(
        "SELECT {REFERENCE_COLUMNS} FROM resource_references \
         WHERE resource_type = $1 AND resource_id = ANY($2) ORDER BY reference_type"
    ))
    .bind(resource_type.as_str())
    .bind(resource_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<String, Vec<ResourceReference>> = HashMap::new();
    for row in &rows {
        let reference = row_to_reference(row)?;
        grouped
            .entry(reference.resource_id.clone())
            .or_default()
            .push(reference);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_column_whitelist() {
        assert_eq!(sort_column("").unwrap(), "created_at");
        assert_eq!(sort_column("name").unwrap(), "name");
        assert!(sort_column("name; DROP TABLE runs").is_err());
    }

    #[test]
    fn test_order_and_page_clause() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM runs WHERE TRUE");
        let opts = ListOptions {
            page_size: 10,
            page_token: Some("20".to_string()),
            sort_by: "name".to_string(),
            descending: true,
        };
        push_order_and_page(&mut qb, &opts).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id FROM runs WHERE TRUE ORDER BY name DESC, id DESC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_reference_filter_binds_key() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM jobs WHERE TRUE");
        let key = ReferenceKey {
            resource_type: ResourceType::Experiment,
            id: "exp-1".to_string(),
        };
        push_reference_filter(&mut qb, "jobs", ResourceType::Job, &key);
        let sql = qb.sql();
        assert!(sql.contains("r.resource_id = jobs.id"));
        assert!(sql.ends_with("AND r.reference_id = $3)"));
    }

    #[test]
    fn test_page_token_points_past_returned_items() {
        let opts = ListOptions::with_page_size(2).next("2".to_string());
        let page = page(vec!["c", "d"], 5, &opts).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("4"));
        assert_eq!(page.total_size, 5);

        let last = super::page(vec!["e"], 5, &opts.next("4".to_string())).unwrap();
        assert!(last.next_page_token.is_none());
    }
}
