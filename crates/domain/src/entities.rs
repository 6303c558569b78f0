use std::fmt;
use std::str::FromStr;

use pipeline_core::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Kind of entity on either side of a resource reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Experiment,
    Job,
    Run,
    Pipeline,
    PipelineVersion,
    Namespace,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Experiment => "Experiment",
            ResourceType::Job => "Job",
            ResourceType::Run => "Run",
            ResourceType::Pipeline => "Pipeline",
            ResourceType::PipelineVersion => "PipelineVersion",
            ResourceType::Namespace => "Namespace",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Experiment" => Ok(ResourceType::Experiment),
            "Job" => Ok(ResourceType::Job),
            "Run" => Ok(ResourceType::Run),
            "Pipeline" => Ok(ResourceType::Pipeline),
            "PipelineVersion" => Ok(ResourceType::PipelineVersion),
            "Namespace" => Ok(ResourceType::Namespace),
            other => Err(PipelineError::invalid_input(format!(
                "Unknown resource type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Owner,
    Creator,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Owner => "Owner",
            Relationship::Creator => "Creator",
        }
    }
}

impl FromStr for Relationship {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Owner" => Ok(Relationship::Owner),
            "Creator" => Ok(Relationship::Creator),
            other => Err(PipelineError::invalid_input(format!(
                "Unknown relationship: {other}"
            ))),
        }
    }
}

/// Typed edge between a run or job and the entities it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub reference_id: String,
    pub reference_name: String,
    pub reference_type: ResourceType,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageState {
    Available,
    Archived,
}

impl StorageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageState::Available => "STORAGESTATE_AVAILABLE",
            StorageState::Archived => "STORAGESTATE_ARCHIVED",
        }
    }
}

impl FromStr for StorageState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STORAGESTATE_AVAILABLE" => Ok(StorageState::Available),
            "STORAGESTATE_ARCHIVED" => Ok(StorageState::Archived),
            other => Err(PipelineError::invalid_input(format!(
                "Unknown storage state: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub created_at: i64,
    pub storage_state: StorageState,
}

/// Lifecycle shared by pipelines and pipeline versions. Rows stay in
/// `Deleting` when blob or row removal fails part-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Creating,
    Ready,
    Deleting,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Creating => "CREATING",
            PipelineStatus::Ready => "READY",
            PipelineStatus::Deleting => "DELETING",
        }
    }
}

impl FromStr for PipelineStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATING" => Ok(PipelineStatus::Creating),
            "READY" => Ok(PipelineStatus::Ready),
            "DELETING" => Ok(PipelineStatus::Deleting),
            other => Err(PipelineError::invalid_input(format!(
                "Unknown pipeline status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub description: String,
    pub namespace: String,
    /// JSON array of the declared parameters.
    pub parameters: String,
    pub status: PipelineStatus,
    pub default_version_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineVersion {
    pub id: String,
    pub name: String,
    pub pipeline_id: String,
    pub parameters: String,
    pub code_source_url: String,
    pub status: PipelineStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Ready,
    Deleting,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Ready => "READY",
            JobStatus::Deleting => "DELETING",
        }
    }
}

impl FromStr for JobStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(JobStatus::Ready),
            "DELETING" => Ok(JobStatus::Deleting),
            other => Err(PipelineError::invalid_input(format!(
                "Unknown job status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub cron: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicSchedule {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub interval_seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub cron_schedule: Option<CronSchedule>,
    pub periodic_schedule: Option<PeriodicSchedule>,
}

impl Trigger {
    /// Exactly one schedule must be set. Cron expressions use the six or
    /// seven field form understood by the recurring-run controller.
    pub fn validate(&self) -> PipelineResult<()> {
        match (&self.cron_schedule, &self.periodic_schedule) {
            (Some(cron), None) => {
                cron::Schedule::from_str(&cron.cron).map_err(|e| {
                    PipelineError::invalid_input(format!(
                        "Invalid cron schedule '{}': {e}",
                        cron.cron
                    ))
                })?;
                check_window(cron.start_time, cron.end_time)
            }
            (None, Some(periodic)) => {
                if periodic.interval_seconds <= 0 {
                    return Err(PipelineError::invalid_input(
                        "Periodic schedule interval must be greater than 0",
                    ));
                }
                check_window(periodic.start_time, periodic.end_time)
            }
            (Some(_), Some(_)) => Err(PipelineError::invalid_input(
                "Only one of cron schedule and periodic schedule may be set",
            )),
            (None, None) => Err(PipelineError::invalid_input(
                "A trigger requires a cron schedule or a periodic schedule",
            )),
        }
    }
}

fn check_window(start: Option<i64>, end: Option<i64>) -> PipelineResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(PipelineError::invalid_input(
                "Trigger start time must not be after its end time",
            ));
        }
    }
    Ok(())
}

/// Template source and parameters recorded on runs and jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpecRecord {
    pub pipeline_id: String,
    pub pipeline_name: String,
    pub workflow_spec_manifest: String,
    /// JSON array of `{name, value}` pairs.
    pub parameters: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// UID of the recurring execution definition.
    pub id: String,
    pub display_name: String,
    /// Name of the recurring execution definition within its namespace.
    pub name: String,
    pub namespace: String,
    pub service_account: String,
    pub description: String,
    pub max_concurrency: i64,
    pub no_catchup: bool,
    pub enabled: bool,
    pub trigger: Trigger,
    pub conditions: String,
    pub status: JobStatus,
    pub pipeline_spec: PipelineSpecRecord,
    pub resource_references: Vec<ResourceReference>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn experiment_id(&self) -> Option<&str> {
        owner_experiment(&self.resource_references)
    }
}

/// Database record of one execution object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub experiment_id: String,
    pub display_name: String,
    /// Name of the execution object, deterministic from the run id.
    pub name: String,
    pub storage_state: StorageState,
    pub namespace: String,
    pub service_account: String,
    pub description: String,
    pub created_at: i64,
    pub scheduled_at: i64,
    /// Zero while the run has not finished.
    pub finished_at: i64,
    pub conditions: String,
    pub pipeline_spec: PipelineSpecRecord,
    pub workflow_runtime_manifest: String,
    pub resource_references: Vec<ResourceReference>,
}

impl Run {
    pub fn job_id(&self) -> Option<&str> {
        self.resource_references
            .iter()
            .find(|r| r.reference_type == ResourceType::Job && r.relationship == Relationship::Creator)
            .map(|r| r.reference_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetric {
    pub run_id: String,
    pub node_id: String,
    pub name: String,
    pub number_value: f64,
    /// "RAW" or "PERCENTAGE".
    pub format: String,
}

impl RunMetric {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.node_id.is_empty() {
            return Err(PipelineError::invalid_input("Metric node id is required"));
        }
        let valid_name = !self.name.is_empty()
            && self.name.len() <= 64
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && self.name.starts_with(|c: char| c.is_ascii_lowercase());
        if !valid_name {
            return Err(PipelineError::invalid_input(format!(
                "Metric name '{}' must match ^[a-z][-a-z0-9]{{0,63}}$",
                self.name
            )));
        }
        if !self.number_value.is_finite() {
            return Err(PipelineError::invalid_input("Metric value must be finite"));
        }
        Ok(())
    }
}

fn owner_experiment(references: &[ResourceReference]) -> Option<&str> {
    references
        .iter()
        .find(|r| {
            r.reference_type == ResourceType::Experiment && r.relationship == Relationship::Owner
        })
        .map(|r| r.reference_id.as_str())
}

/// Restricts a listing to entities referencing the given key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    pub reference_key: Option<ReferenceKey>,
}

impl FilterContext {
    pub fn by(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            reference_key: Some(ReferenceKey {
                resource_type,
                id: id.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceKey {
    pub resource_type: ResourceType,
    pub id: String,
}

/// Offset pagination. Page tokens are the stringified offset of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub page_size: usize,
    pub page_token: Option<String>,
    pub sort_by: String,
    pub descending: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            page_token: None,
            sort_by: "created_at".to_string(),
            descending: false,
        }
    }
}

impl ListOptions {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn next(&self, token: String) -> Self {
        Self {
            page_token: Some(token),
            ..self.clone()
        }
    }

    pub fn offset(&self) -> PipelineResult<usize> {
        match &self.page_token {
            None => Ok(0),
            Some(token) if token.is_empty() => Ok(0),
            Some(token) => token
                .parse()
                .map_err(|_| PipelineError::invalid_input(format!("Invalid page token: {token}"))),
        }
    }

    /// Slices an already sorted collection into one page.
    pub fn paginate<T: Clone>(&self, items: &[T]) -> PipelineResult<ListPage<T>> {
        let offset = self.offset()?;
        let page_size = self.page_size.max(1);
        let end = (offset + page_size).min(items.len());
        let page = if offset < items.len() {
            items[offset..end].to_vec()
        } else {
            Vec::new()
        };
        let next_page_token = (end < items.len()).then(|| end.to_string());
        Ok(ListPage {
            items: page,
            total_size: items.len(),
            next_page_token,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total_size: usize,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_walks_all_pages() {
        let items: Vec<u32> = (0..7).collect();
        let opts = ListOptions::with_page_size(3);

        let first = opts.paginate(&items).unwrap();
        assert_eq!(first.items, vec![0, 1, 2]);
        assert_eq!(first.total_size, 7);
        let token = first.next_page_token.unwrap();

        let second = opts.next(token).paginate(&items).unwrap();
        assert_eq!(second.items, vec![3, 4, 5]);

        let third = opts
            .next(second.next_page_token.unwrap())
            .paginate(&items)
            .unwrap();
        assert_eq!(third.items, vec![6]);
        assert!(third.next_page_token.is_none());
    }

    #[test]
    fn test_invalid_page_token() {
        let opts = ListOptions::default().next("abc".to_string());
        assert!(opts.offset().is_err());
    }

    #[test]
    fn test_trigger_validation() {
        let cron = Trigger {
            cron_schedule: Some(CronSchedule {
                cron: "0 0 * * * *".to_string(),
                ..Default::default()
            }),
            periodic_schedule: None,
        };
        assert!(cron.validate().is_ok());

        let bad_cron = Trigger {
            cron_schedule: Some(CronSchedule {
                cron: "every minute".to_string(),
                ..Default::default()
            }),
            periodic_schedule: None,
        };
        assert!(bad_cron.validate().is_err());

        let periodic = Trigger {
            cron_schedule: None,
            periodic_schedule: Some(PeriodicSchedule {
                interval_seconds: 0,
                ..Default::default()
            }),
        };
        assert!(periodic.validate().is_err());
        assert!(Trigger::default().validate().is_err());
    }

    #[test]
    fn test_metric_name_validation() {
        let mut metric = RunMetric {
            run_id: "r".to_string(),
            node_id: "node-1".to_string(),
            name: "accuracy".to_string(),
            number_value: 0.93,
            format: "RAW".to_string(),
        };
        assert!(metric.validate().is_ok());
        metric.name = "Accuracy".to_string();
        assert!(metric.validate().is_err());
        metric.name = "accuracy".to_string();
        metric.number_value = f64::NAN;
        assert!(metric.validate().is_err());
    }
}
