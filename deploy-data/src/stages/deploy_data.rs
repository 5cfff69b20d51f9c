//! `deploy-data`: artifact properties recording where the package landed

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use crate::errors::DeployDataError;
use crate::models::deployment::{DeploymentData, OverallStatus};
use crate::models::quality::SubtaskUpdate;
use crate::outputs::Outputs;
use crate::progression::resolver::CdInputs;

static PASSING_SMOKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(pass|SUCCESS)").expect("valid regex"));

const PREPROD_TIER: &str = "PREPROD";
const PREPROD_VALIDATION: &str = "preprod_validation";

/// Subtask update for the preprod validation, passing only when P1 and target both passed
fn preprod_validation(record: &DeploymentData) -> SubtaskUpdate {
    let post_deploy = &record.post_deploy;
    let or_skipped = |value: &Option<String>| value.clone().unwrap_or_else(|| "SKIPPED".to_string());
    let p1_result = or_skipped(&post_deploy.p1_result);
    let target_result = or_skipped(&post_deploy.target_result);

    let comment = format!(
        "P1 tests: {} ({} tests). Target tests: {} ({} tests). ",
        or_skipped(&post_deploy.p1_status),
        or_skipped(&post_deploy.p1_total_tests),
        or_skipped(&post_deploy.target_status),
        or_skipped(&post_deploy.target_total_tests),
    );
    SubtaskUpdate::with_comment(p1_result.contains("pass") && target_result.contains("pass"), comment)
}

pub fn run(record: &mut DeploymentData, cd: &CdInputs, outputs: &mut Outputs) -> Result<(), DeployDataError> {
    let deploy_env = cd.normalize_env(&record.env);

    let mut props = Map::new();
    props.insert("DEPLOY".to_string(), Value::String(deploy_env.clone()));
    props.insert("LAST_DEPLOYED_ENV".to_string(), Value::String(deploy_env.clone()));

    if record.is_cd() {
        let preprod = record
            .auto_deploy
            .as_ref()
            .is_some_and(|cd| cd.env_name == PREPROD_TIER);
        if preprod {
            let update = preprod_validation(record);
            record
                .quality_mut()?
                .jira_subtask_updates
                .insert(PREPROD_VALIDATION.to_string(), update);
        }

        let smoke_passed = record
            .post_deploy
            .test_result
            .as_deref()
            .is_some_and(|result| PASSING_SMOKE.is_match(result));
        if record.post_deploy.overall_status == Some(OverallStatus::Success) && smoke_passed {
            props.insert("CONTINUOUS_DEPLOY".to_string(), Value::String(deploy_env));
        }
    }

    outputs.set_json("deploy-props", &props)?;
    let rendered = outputs.get("deploy-props").unwrap_or_default();
    info!("Deploy properties for {}: {}", record.name, rendered);
    Ok(())
}
