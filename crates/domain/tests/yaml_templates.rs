//! Mutation of YAML templates as uploaded by users.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use pipeline_core::constants::{ANNOTATION_ARTIFACT_BUCKET, LABEL_RUN_ID};
use pipeline_core::ManagerOptions;
use pipeline_domain::{mutate, MutationRequest, RunIdentity, Workflow};

const TEMPLATE: &str = r#"
apiVersion: tekton.dev/v1beta1
kind: PipelineRun
metadata:
  generateName: flip-coin-
  annotations:
    tekton.dev/artifact_items: '{"flip": [["output", "$(results.output.path)"]]}'
spec:
  params:
    - name: seed
      value: "7"
  pipelineSpec:
    params:
      - name: seed
    tasks:
      - name: flip
        taskSpec:
          steps:
            - name: main
              image: python:3.9
              script: python -c "import random"
"#;

fn run<'a>(parameters: &'a BTreeMap<String, String>, service_account: &'a str) -> MutationRequest<'a> {
    MutationRequest {
        parameters,
        service_account,
        run: Some(RunIdentity {
            run_id: "abcdef12-3456-7890-abcd-ef1234567890",
            run_name: "flip once",
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }),
    }
}

#[test]
fn test_yaml_template_gets_archival_step_and_identity() {
    let parameters = BTreeMap::from([("seed".to_string(), "42".to_string())]);
    let mutated = mutate(
        TEMPLATE.as_bytes(),
        &run(&parameters, ""),
        &ManagerOptions::default(),
    )
    .unwrap();
    let wf = mutated.workflow;

    assert_eq!(wf.metadata.name, "flip-coin-abcde");
    assert!(wf.metadata.generate_name.is_empty());
    assert_eq!(wf.metadata.labels[LABEL_RUN_ID], "abcdef12-3456-7890-abcd-ef1234567890");
    assert_eq!(wf.metadata.annotations[ANNOTATION_ARTIFACT_BUCKET], "mlpipeline");
    assert_eq!(wf.parameters_as_map()["seed"], "42");

    let task = &wf.spec.pipeline_spec.as_ref().unwrap().tasks[0];
    let steps = &task.task_spec.as_ref().unwrap().steps;
    assert_eq!(steps.len(), 2);
    let script = steps[1]["script"].as_str().unwrap();
    assert!(script.contains("push_artifact output $(results.output.path)"));

    // The submitted manifest parses back into the same object.
    let reparsed = Workflow::from_manifest(&wf.to_manifest().unwrap()).unwrap();
    assert_eq!(reparsed, wf);
}

#[test]
fn test_service_account_defaulting_matrix() {
    let parameters = BTreeMap::new();
    let options = ManagerOptions {
        default_service_account: "configured-sa".to_string(),
        ..ManagerOptions::default()
    };
    let with_template_sa = |template_sa: &str| {
        if template_sa.is_empty() {
            TEMPLATE.to_string()
        } else {
            TEMPLATE.replace("spec:\n  params:", &format!("spec:\n  serviceAccountName: {template_sa}\n  params:"))
        }
    };

    let cases = [
        ("explicit", "", "explicit"),
        ("explicit", "pipeline-runner", "explicit"),
        ("explicit", "team-sa", "explicit"),
        ("", "", "configured-sa"),
        ("", "pipeline-runner", "configured-sa"),
        ("", "team-sa", "team-sa"),
    ];
    for (requested, template_sa, expected) in cases {
        let template = with_template_sa(template_sa);
        let wf = mutate(template.as_bytes(), &run(&parameters, requested), &options)
            .unwrap()
            .workflow;
        assert_eq!(
            wf.spec.service_account_name, expected,
            "requested={requested:?} template={template_sa:?}"
        );
    }
}
