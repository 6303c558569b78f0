use pipeline_core::{PipelineError, PipelineResult};
use serde_json::Value;

/// One inline custom-resource template, addressed the way the cluster REST
/// API expects it.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomResource {
    pub group: String,
    pub version: String,
    /// Lowercased kind with an `s` suffix.
    pub plural: String,
    pub name: String,
    pub body: Value,
}

/// Parses the JSON array carried by the resource-templates annotation.
/// A single malformed entry rejects the whole list.
pub fn parse_custom_resources(raw: &str) -> PipelineResult<Vec<CustomResource>> {
    let templates: Vec<Value> = serde_json::from_str(raw).map_err(|e| {
        PipelineError::invalid_input(format!("Custom resource templates are not a JSON array: {e}"))
    })?;

    templates.into_iter().map(parse_one).collect()
}

fn parse_one(template: Value) -> PipelineResult<CustomResource> {
    let api_version = template
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::invalid_input("Custom resource template is missing apiVersion"))?;
    let (group, version) = api_version
        .split_once('/')
        .filter(|(g, v)| !g.is_empty() && !v.is_empty())
        .ok_or_else(|| {
            PipelineError::invalid_input(format!(
                "Custom resource apiVersion '{api_version}' must have the form group/version"
            ))
        })?;
    let kind = template
        .get("kind")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| PipelineError::invalid_input("Custom resource template is missing kind"))?;
    let name = template
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            PipelineError::invalid_input("Custom resource template is missing metadata.name")
        })?;

    Ok(CustomResource {
        group: group.to_string(),
        version: version.to_string(),
        plural: format!("{}s", kind.to_lowercase()),
        name: name.to_string(),
        body: template.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::ErrorKind;

    #[test]
    fn test_parse_derives_group_version_plural() {
        let raw = r#"[{"apiVersion":"custom.tekton.dev/v1alpha1","kind":"PipelineLoop","metadata":{"name":"loop-1"},"spec":{"iterateParam":"x"}}]"#;
        let resources = parse_custom_resources(raw).unwrap();
        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert_eq!(resource.group, "custom.tekton.dev");
        assert_eq!(resource.version, "v1alpha1");
        assert_eq!(resource.plural, "pipelineloops");
        assert_eq!(resource.name, "loop-1");
        assert_eq!(resource.body["spec"]["iterateParam"], "x");
    }

    #[test]
    fn test_missing_field_rejects_whole_list() {
        let raw = r#"[
            {"apiVersion":"custom.tekton.dev/v1alpha1","kind":"PipelineLoop","metadata":{"name":"ok"}},
            {"apiVersion":"custom.tekton.dev/v1alpha1","metadata":{"name":"no-kind"}}
        ]"#;
        let err = parse_custom_resources(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let no_name = r#"[{"apiVersion":"a/v1","kind":"Thing","metadata":{}}]"#;
        assert!(parse_custom_resources(no_name).is_err());

        let core_group = r#"[{"apiVersion":"v1","kind":"ConfigMap","metadata":{"name":"c"}}]"#;
        assert!(parse_custom_resources(core_group).is_err());
    }
}
