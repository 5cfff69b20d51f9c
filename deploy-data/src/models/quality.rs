//! Quality gate results captured when the deployment record is created

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NOT_APPLICABLE: &str = "N/A";
pub const EXEMPT: &str = "EXEMPT";

fn not_applicable() -> String {
    NOT_APPLICABLE.to_string()
}

/// Appsec outcome: `false` when nothing failed, otherwise the failing ticket comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppsecFail {
    Flag(bool),
    Comment(String),
}

impl Default for AppsecFail {
    fn default() -> Self {
        AppsecFail::Flag(false)
    }
}

impl AppsecFail {
    pub fn failed(&self) -> bool {
        match self {
            AppsecFail::Flag(flag) => *flag,
            AppsecFail::Comment(comment) => !comment.is_empty(),
        }
    }
}

/// Ticket subtask status or a pending update to it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub st_status: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SubtaskUpdate {
    pub fn status(st_status: bool) -> Self {
        Self {
            st_status,
            ..Default::default()
        }
    }

    pub fn with_comment(st_status: bool, comment: impl Into<String>) -> Self {
        Self {
            st_status,
            comment: Some(comment.into()),
            ..Default::default()
        }
    }
}

/// Per-run record of quality gate results.
///
/// Read-only after creation, except for `jira_subtask_updates` which later
/// stages append to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySnapshot {
    #[serde(default = "not_applicable")]
    pub sonar: String,

    #[serde(default = "not_applicable")]
    pub sonar_date: String,

    #[serde(default = "not_applicable")]
    pub autorollback: String,

    #[serde(default = "not_applicable")]
    pub autorollback_date: String,

    #[serde(default)]
    pub autorollback_enabled: bool,

    #[serde(default = "not_applicable")]
    pub regression: String,

    #[serde(default = "not_applicable")]
    pub regression_date: String,

    #[serde(default = "not_applicable")]
    pub regression_pass: String,

    #[serde(default)]
    pub regression_enabled: bool,

    #[serde(default = "not_applicable")]
    pub ams: String,

    /// Critical tests already passed for this environment
    #[serde(default)]
    pub skip_critical: bool,

    /// Smoke tests already passed for this environment
    #[serde(default)]
    pub skip_smoke: bool,

    #[serde(default = "not_applicable")]
    pub sre_slo_id: String,

    #[serde(default = "not_applicable")]
    pub synthetic_id: String,

    #[serde(default)]
    pub nexus_id: String,

    #[serde(default)]
    pub checkmarx_id: String,

    #[serde(default)]
    pub branch: String,

    #[serde(default)]
    pub appsec_fail: AppsecFail,

    /// Critical tests passed before the deployment
    #[serde(default)]
    pub critical_pre: Option<i64>,

    #[serde(default)]
    pub core_name: Option<String>,

    /// Manifest flow only: a gate failed and the package is dropped from the manifest
    #[serde(default)]
    pub quality_fail: bool,

    #[serde(default)]
    pub jira_subtask_updates: BTreeMap<String, SubtaskUpdate>,
}

impl Default for QualitySnapshot {
    fn default() -> Self {
        Self {
            sonar: not_applicable(),
            sonar_date: not_applicable(),
            autorollback: not_applicable(),
            autorollback_date: not_applicable(),
            autorollback_enabled: false,
            regression: not_applicable(),
            regression_date: not_applicable(),
            regression_pass: not_applicable(),
            regression_enabled: false,
            ams: not_applicable(),
            skip_critical: false,
            skip_smoke: false,
            sre_slo_id: not_applicable(),
            synthetic_id: not_applicable(),
            nexus_id: String::new(),
            checkmarx_id: String::new(),
            branch: String::new(),
            appsec_fail: AppsecFail::default(),
            critical_pre: None,
            core_name: None,
            quality_fail: false,
            jira_subtask_updates: BTreeMap::new(),
        }
    }
}

impl QualitySnapshot {
    /// Snapshot for a dispatcher package, which bypasses every gate
    pub fn exempt() -> Self {
        Self {
            sonar: EXEMPT.to_string(),
            autorollback: EXEMPT.to_string(),
            regression: EXEMPT.to_string(),
            ams: EXEMPT.to_string(),
            skip_critical: true,
            skip_smoke: true,
            ..Default::default()
        }
    }
}
