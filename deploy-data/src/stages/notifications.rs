//! `aem-notifications`: notification, insights and ticket-update payloads
//!
//! Only the data is produced here. Rendering and delivery belong to the
//! workflow steps that consume the outputs.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::DeployDataError;
use crate::models::deployment::{DeploymentData, OverallStatus};
use crate::outputs::Outputs;

const EMAIL_DOMAIN: &str = "kp.org";

/// Pipeline inputs for the notification payloads
#[derive(Debug, Clone, Default)]
pub struct NotifyInputs {
    /// Continuous-deployment quality result (`TEST_RESULT`, `True` when passed)
    pub cd_status: Option<String>,

    pub build_url: Option<String>,

    /// Artifact properties were supplied, so the deployment ticket exists
    pub has_artifact_props: bool,

    pub actor: String,
}

/// Payload for the notification step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMap {
    pub build_status: Option<OverallStatus>,
    pub message: Option<String>,
    pub environment: String,
    pub artifact_name: Option<String>,
    pub email_recipients: Vec<String>,
    pub teams_channel: Option<String>,
}

/// CD runs pass when the post-deploy status held and the CD quality gate passed
pub fn cd_passed(record: &DeploymentData, cd_status: Option<&str>) -> bool {
    let status_ok = matches!(
        record.post_deploy.overall_status.unwrap_or(OverallStatus::Success),
        OverallStatus::Success | OverallStatus::SkippedRollback
    );
    status_ok && cd_status == Some("True")
}

/// Build the notification map, if notifications are configured
pub fn notification_map(record: &DeploymentData, inputs: &NotifyInputs) -> Option<NotificationMap> {
    let configured = record.deploy_package.notification_map();
    if configured.is_none() && !record.manifest_deploy {
        return None;
    }

    let setting = |key: &str| {
        configured
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    };

    let mut email_recipients: Vec<String> = setting("email_recipients")
        .and_then(Value::as_array)
        .map(|emails| emails.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if record.manifest_deploy {
        match record.deploy_package.jira_reporter() {
            Some(reporter) => email_recipients.push(reporter.to_string()),
            None => warn!("Manifest for {} has no Jira reporter", record.name),
        }
    } else {
        email_recipients.push(format!("{}@{}", inputs.actor, EMAIL_DOMAIN));
    }

    let teams_channel = setting("teams_channel")
        .and_then(Value::as_str)
        .filter(|channel| !channel.is_empty())
        .map(str::to_string)
        .or_else(|| {
            record
                .auto_deploy
                .as_ref()
                .map(|cd| cd.teams_channel.clone())
                .filter(|channel| !channel.is_empty())
        });

    Some(NotificationMap {
        build_status: record.post_deploy.overall_status,
        message: record.post_deploy.comments.clone(),
        environment: record.env.clone(),
        artifact_name: record.deploy_package.module_values_deploy.artifact_id.clone(),
        email_recipients,
        teams_channel,
    })
}

/// Deployment summary for the insights collector
pub fn insights(record: &DeploymentData, build_url: Option<&str>) -> Result<Value, DeployDataError> {
    let mut data = serde_json::to_value(&record.deploy_package.module_values_deploy)?;
    if let Value::Object(map) = &mut data {
        let rollback_version = record
            .deploy_package
            .module_values_rollback
            .artifact_version
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null);
        map.insert("rollback_version".to_string(), rollback_version);
        map.insert(
            "rollback".to_string(),
            Value::Bool(record.post_deploy.overall_status == Some(OverallStatus::Rollback)),
        );
        map.insert("app_type".to_string(), Value::String("aem".to_string()));
        map.insert("deploy_env".to_string(), Value::String(record.env.clone()));
        map.insert("name".to_string(), Value::String(record.name.clone()));
        map.insert("manifest".to_string(), Value::Bool(record.manifest_deploy));
        map.insert(
            "build_url".to_string(),
            build_url.map(|url| Value::String(url.to_string())).unwrap_or(Value::Null),
        );
    }
    Ok(data)
}

pub fn run(record: &mut DeploymentData, inputs: &NotifyInputs, outputs: &mut Outputs) -> Result<(), DeployDataError> {
    if !record.post_deploy.is_empty() {
        if record.is_cd() && !cd_passed(record, inputs.cd_status.as_deref()) {
            info!("Continuous deployment failed for {}; flagging rollback", record.name);
            record.deploy.rollback = true;
        }

        match notification_map(record, inputs) {
            Some(notify) => {
                debug!("Notification map: {:?}", notify);
                outputs.set_json("notification-map", &notify)?;
            }
            None => info!("No notifications configured."),
        }

        let insights = insights(record, inputs.build_url.as_deref())?;
        info!("Deploy data for insights: {}", insights);
        outputs.set_json("deploy-data", &insights)?;
    }

    if inputs.has_artifact_props && record.is_cd() {
        let updates = &record.quality()?.jira_subtask_updates;
        if !updates.is_empty() {
            outputs.set_json("jira-comment", updates)?;
        }
    }
    Ok(())
}
