//! Release-record reconciliation
//!
//! Compares the release ticket already on file for this package with the
//! freshly resolved progression, and queues the subtask updates that follow.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::DeployDataError;
use crate::models::auto_deploy::AutoDeploy;
use crate::models::de;
use crate::models::quality::{AppsecFail, QualitySnapshot, SubtaskUpdate};

const JIRA_DATE_FORMAT: &str = "%b.%d.%Y";
const SNOW_DATE_FORMAT: &str = "%m/%d/%Y";

/// Release ticket as last recorded
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub jira_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub crq_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub sre_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub load_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub ada_id: Option<String>,

    /// `Jan.15.2027`
    #[serde(default, deserialize_with = "de::opt_string")]
    pub release_date: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub app_version: Option<String>,

    #[serde(default)]
    pub secondary_data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubtaskRecord {
    #[serde(default)]
    pub st_type: String,

    #[serde(default, deserialize_with = "de::bool_lenient")]
    pub st_status: bool,
}

/// `RELEASE_RECORD` input
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReleaseRecord {
    #[serde(default)]
    pub release: Option<ReleaseInfo>,

    #[serde(default)]
    pub subtasks: Vec<SubtaskRecord>,
}

/// `APPSEC_RESULT` input
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppsecResult {
    #[serde(default)]
    pub result: Option<String>,

    #[serde(default)]
    pub jira_comment: Option<String>,
}

impl AppsecResult {
    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.jira_comment.is_none()
    }

    fn comment(&self) -> &str {
        self.jira_comment.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseInputs {
    pub release_record: ReleaseRecord,
    pub appsec_result: AppsecResult,
}

fn dates_differ(jira_date: &str, scheduled_date: &str) -> Result<bool, DeployDataError> {
    let jira = NaiveDate::parse_from_str(jira_date, JIRA_DATE_FORMAT).map_err(|e| {
        DeployDataError::ValidationError(format!("Invalid release date {}: {}", jira_date, e))
    })?;
    let scheduled = NaiveDate::parse_from_str(scheduled_date, SNOW_DATE_FORMAT).map_err(|e| {
        DeployDataError::ValidationError(format!("Invalid ScheduledDate {}: {}", scheduled_date, e))
    })?;
    if jira != scheduled {
        warn!(
            "Mismatch in release dates: release ticket has {}, change request has {}",
            jira, scheduled
        );
    }
    Ok(jira != scheduled)
}

/// Fold the release record and appsec result into the new record.
///
/// Returns the release ticket id when one is on file.
pub fn reconcile(
    auto_deploy: &mut AutoDeploy,
    quality: &mut QualitySnapshot,
    package_version: Option<&str>,
    inputs: &ReleaseInputs,
) -> Result<Option<String>, DeployDataError> {
    let release = inputs.release_record.release.clone().unwrap_or_default();
    info!("Release record: {:?}", release);

    let mut updates: BTreeMap<String, SubtaskUpdate> = BTreeMap::new();

    auto_deploy.jira_id = release.jira_id.clone().unwrap_or_default();
    auto_deploy.crq_id = release.crq_id.clone().unwrap_or_default();
    auto_deploy.sre_id = release.sre_id.clone().unwrap_or_default();
    auto_deploy.load_id = release.load_id.clone().unwrap_or_default();
    auto_deploy.ada_id = release.ada_id.clone().unwrap_or_default();

    let scheduled_date = auto_deploy
        .snow_details
        .get("ScheduledDate")
        .and_then(Value::as_str)
        .filter(|date| !date.is_empty());
    let mut update_release = match (release.release_date.as_deref(), scheduled_date) {
        (Some(jira_date), Some(scheduled)) => dates_differ(jira_date, scheduled)?,
        _ => false,
    };

    let jira_subtasks = inputs
        .release_record
        .subtasks
        .iter()
        .map(|subtask| (subtask.st_type.clone(), SubtaskUpdate::status(subtask.st_status)))
        .collect();

    let package_version = package_version.unwrap_or_default();
    if let Some(release_version) = release.app_version.as_deref().filter(|v| !v.is_empty()) {
        if release_version != package_version {
            info!("Updating release version from {} to {}", release_version, package_version);
            update_release = true;
            updates.insert("regression_result".to_string(), SubtaskUpdate::status(false));
            updates.insert("dod_result".to_string(), SubtaskUpdate::status(false));
        }
    }

    if update_release {
        auto_deploy.sre_id.clear();
    }

    if let (Some(content), Some(secondary)) = (&auto_deploy.content, &release.secondary_data) {
        let released_version = secondary.get("content_version").and_then(de::scalar_string);
        if released_version.is_some() && released_version == content.content_version {
            info!("Content details match the release record; content package is reused");
            auto_deploy.content = None;
        } else {
            info!("Content details changed; content package will be rebuilt");
            updates.insert(
                "content_result".to_string(),
                SubtaskUpdate {
                    title: Some("Content package".to_string()),
                    ..SubtaskUpdate::with_comment(true, "Content package updated.")
                },
            );
            update_release = true;
        }
    }

    let appsec = &inputs.appsec_result;
    match appsec.result.as_deref() {
        Some("FAILED") => {
            quality.appsec_fail = AppsecFail::Comment(appsec.comment().to_string());
        }
        _ if !appsec.is_empty() => {
            if appsec.result.as_deref() == Some("PASSED") {
                updates.insert(
                    "appsec_result".to_string(),
                    SubtaskUpdate::with_comment(true, appsec.comment()),
                );
                auto_deploy.appsec_result = if appsec.comment().to_lowercase().contains("exception-tro") {
                    "Exception-TRO".to_string()
                } else {
                    "Approved".to_string()
                };
            }
            if auto_deploy.load_self_waived {
                updates.insert(
                    "load_result".to_string(),
                    SubtaskUpdate::with_comment(true, "Load ticket created."),
                );
            }
        }
        _ => {}
    }

    auto_deploy.update_release = update_release;
    auto_deploy.jira_subtasks = jira_subtasks;
    quality.jira_subtask_updates = updates;

    Ok(release.jira_id.filter(|id| !id.is_empty()))
}
