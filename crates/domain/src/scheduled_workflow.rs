//! Typed view over the recurring execution definition (`ScheduledWorkflow`).

use chrono::{DateTime, SecondsFormat, Utc};
use pipeline_core::constants::{
    SCHEDULED_WORKFLOW_GROUP, SCHEDULED_WORKFLOW_KIND, SCHEDULED_WORKFLOW_VERSION,
};
use pipeline_core::PipelineResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entities::{CronSchedule, PeriodicSchedule, Trigger};
use crate::workflow::{null_default, ObjectMeta, WorkflowSpec};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledWorkflow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ScheduledWorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ScheduledWorkflowStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledWorkflowSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_catchup: Option<bool>,
    #[serde(default)]
    pub trigger: SwfTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwfTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<SwfCronSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_schedule: Option<SwfPeriodicSchedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwfCronSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub cron: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwfPeriodicSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub interval_second: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwfParameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResource {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SwfParameter>,
    #[serde(default)]
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledWorkflowStatus {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<SwfCondition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwfCondition {
    #[serde(rename = "type", default)]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn to_rfc3339(seconds: Option<i64>) -> Option<String> {
    seconds
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn from_rfc3339(raw: &Option<String>) -> Option<i64> {
    raw.as_deref()
        .and_then(|r| DateTime::parse_from_rfc3339(r).ok())
        .map(|t| t.timestamp())
}

impl From<&Trigger> for SwfTrigger {
    fn from(trigger: &Trigger) -> Self {
        SwfTrigger {
            cron_schedule: trigger.cron_schedule.as_ref().map(|c| SwfCronSchedule {
                start_time: to_rfc3339(c.start_time),
                end_time: to_rfc3339(c.end_time),
                cron: c.cron.clone(),
            }),
            periodic_schedule: trigger.periodic_schedule.as_ref().map(|p| SwfPeriodicSchedule {
                start_time: to_rfc3339(p.start_time),
                end_time: to_rfc3339(p.end_time),
                interval_second: p.interval_seconds,
            }),
        }
    }
}

impl From<&SwfTrigger> for Trigger {
    fn from(trigger: &SwfTrigger) -> Self {
        Trigger {
            cron_schedule: trigger.cron_schedule.as_ref().map(|c| CronSchedule {
                start_time: from_rfc3339(&c.start_time),
                end_time: from_rfc3339(&c.end_time),
                cron: c.cron.clone(),
            }),
            periodic_schedule: trigger.periodic_schedule.as_ref().map(|p| PeriodicSchedule {
                start_time: from_rfc3339(&p.start_time),
                end_time: from_rfc3339(&p.end_time),
                interval_seconds: p.interval_second,
            }),
        }
    }
}

impl ScheduledWorkflow {
    pub fn new(generate_name: String, spec: ScheduledWorkflowSpec) -> Self {
        ScheduledWorkflow {
            api_version: format!("{SCHEDULED_WORKFLOW_GROUP}/{SCHEDULED_WORKFLOW_VERSION}"),
            kind: SCHEDULED_WORKFLOW_KIND.to_string(),
            metadata: ObjectMeta {
                generate_name,
                ..ObjectMeta::default()
            },
            spec,
            status: None,
        }
    }

    /// Type of the most recent status condition, empty before the first
    /// controller pass.
    pub fn condition(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.last())
            .map(|c| c.condition_type.clone())
            .unwrap_or_default()
    }

    pub fn to_manifest(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
