//! Caller-facing creation requests, after wire decoding.

use std::collections::BTreeMap;

use pipeline_core::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

use crate::entities::{Relationship, ResourceType, Trigger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKey {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub key: ResourceKey,
    #[serde(default)]
    pub name: String,
    pub relationship: Relationship,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, id: impl Into<String>, relationship: Relationship) -> Self {
        Self {
            key: ResourceKey {
                resource_type,
                id: id.into(),
            },
            name: String::new(),
            relationship,
        }
    }
}

/// Id of the first reference of the given type and relationship.
pub fn find_reference(
    references: &[ResourceRef],
    resource_type: ResourceType,
    relationship: Relationship,
) -> Option<&str> {
    references
        .iter()
        .find(|r| r.key.resource_type == resource_type && r.relationship == relationship)
        .map(|r| r.key.id.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub pipeline_name: String,
    #[serde(default)]
    pub workflow_manifest: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl PipelineSpec {
    pub fn parameters_map(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    pub fn parameters_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(&self.parameters)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pipeline_spec: PipelineSpec,
    #[serde(default)]
    pub resource_references: Vec<ResourceRef>,
    #[serde(default)]
    pub service_account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pipeline_spec: PipelineSpec,
    #[serde(default)]
    pub resource_references: Vec<ResourceRef>,
    #[serde(default)]
    pub service_account: String,
    #[serde(default)]
    pub max_concurrency: i64,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub no_catchup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource_references: Vec<ResourceRef>,
}

impl ExperimentRequest {
    pub fn namespace(&self) -> &str {
        find_reference(
            &self.resource_references,
            ResourceType::Namespace,
            Relationship::Owner,
        )
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineVersionRequest {
    pub name: String,
    #[serde(default)]
    pub code_source_url: String,
    #[serde(default)]
    pub resource_references: Vec<ResourceRef>,
}

impl PipelineVersionRequest {
    pub fn pipeline_id(&self) -> PipelineResult<&str> {
        find_reference(
            &self.resource_references,
            ResourceType::Pipeline,
            Relationship::Owner,
        )
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            PipelineError::invalid_input("Pipeline version requires an owning pipeline reference")
        })
    }
}

/// Upper bound on the generated-name prefix of recurring definitions.
const MAX_GENERATED_NAME_LEN: usize = 25;

/// Lowercase DNS-1123 prefix for a recurring definition's generated name.
pub fn generated_name_for(display_name: &str) -> PipelineResult<String> {
    let mut name: String = display_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name = name.trim_start_matches(|c: char| !c.is_ascii_lowercase()).to_string();
    name.truncate(MAX_GENERATED_NAME_LEN);
    let name = name.trim_end_matches('-').to_string();
    if name.is_empty() {
        return Err(PipelineError::invalid_input(format!(
            "Cannot derive a resource name from '{display_name}'"
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_is_sanitized_and_truncated() {
        assert_eq!(generated_name_for("My Nightly_Job").unwrap(), "my-nightly-job");
        assert_eq!(
            generated_name_for("1-train a very long pipeline name indeed").unwrap(),
            "train-a-very-long-pipelin"
        );
        assert!(generated_name_for("!!!").is_err());
    }

    #[test]
    fn test_version_requires_pipeline_owner() {
        let request = PipelineVersionRequest {
            name: "v2".to_string(),
            ..Default::default()
        };
        assert!(request.pipeline_id().is_err());

        let request = PipelineVersionRequest {
            name: "v2".to_string(),
            code_source_url: String::new(),
            resource_references: vec![ResourceRef::new(
                ResourceType::Pipeline,
                "p-1",
                Relationship::Owner,
            )],
        };
        assert_eq!(request.pipeline_id().unwrap(), "p-1");
    }
}
