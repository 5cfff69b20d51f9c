//! Release-readiness config (`ReleaseReadinessConfig.yaml`)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::de;

/// Jira section of the release-readiness config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraDetails {
    /// Tier name to `true` or a CSV of physical environments, in deployment order
    #[serde(default)]
    pub environments: Map<String, Value>,

    #[serde(rename = "fixVersion", default, deserialize_with = "de::opt_string")]
    pub fix_version: Option<String>,

    /// Tiers that run regression tests
    #[serde(default)]
    pub regression: Vec<String>,

    /// Tiers that run definition-of-done checks
    #[serde(default)]
    pub dod: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadIntakeDetails {
    #[serde(rename = "loadSelfWaived", default, deserialize_with = "de::bool_lenient")]
    pub load_self_waived: bool,
}

/// Content package metadata; `content_id`/`content_version` are derived when a change is declared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPackage {
    #[serde(rename = "contentChange", default, deserialize_with = "de::bool_lenient")]
    pub content_change: bool,

    #[serde(rename = "contentDetails", default)]
    pub content_details: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The declarative release plan for one package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReadinessConfig {
    #[serde(rename = "jiraDetails", default)]
    pub jira_details: JiraDetails,

    #[serde(rename = "releaseType", default, deserialize_with = "de::opt_string")]
    pub release_type: Option<String>,

    #[serde(rename = "snowDetails", default)]
    pub snow_details: Map<String, Value>,

    #[serde(default)]
    pub content: Option<ContentPackage>,

    #[serde(rename = "arbRisk", default, deserialize_with = "de::bool_lenient")]
    pub arb_risk: bool,

    #[serde(rename = "arbRiskComment", default, deserialize_with = "de::opt_string")]
    pub arb_risk_comment: Option<String>,

    #[serde(rename = "qTestFolder", default, deserialize_with = "de::opt_string")]
    pub qtest_folder: Option<String>,

    #[serde(rename = "loadIntakeDetails", default)]
    pub load_intake_details: LoadIntakeDetails,

    #[serde(rename = "backoutArtifactVersion", default, deserialize_with = "de::opt_string")]
    pub backout_artifact_version: Option<String>,

    #[serde(rename = "openEnrollmentRiskAnalysis", default)]
    pub open_enrollment_risk_analysis: Option<Value>,
}

impl ReleaseReadinessConfig {
    /// Scheduled release date (`MM/DD/YYYY`) from the change-request section
    pub fn scheduled_date(&self) -> Option<&str> {
        self.snow_details
            .get("ScheduledDate")
            .and_then(Value::as_str)
            .filter(|date| !date.is_empty())
    }

    pub fn is_tier_enabled(&self, tier: &str) -> bool {
        self.jira_details
            .environments
            .get(tier)
            .map(de::truthy)
            .unwrap_or(false)
    }
}
