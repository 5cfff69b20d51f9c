//! Continuous-deployment progression of a package through its environments

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::quality::SubtaskUpdate;
use crate::models::rrc::ContentPackage;

fn default_release_type() -> String {
    "general".to_string()
}

/// Where this package sits in its release plan.
///
/// Computed once when the record is created and carried unchanged through
/// later stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDeploy {
    /// Tier of the current deploy target
    #[serde(default)]
    pub env_name: String,

    /// Ticket transition id for this deployment
    #[serde(default)]
    pub env_id: String,

    /// Next physical environment, empty when the plan is complete
    #[serde(default)]
    pub next_env: String,

    #[serde(default)]
    pub next_env_name: String,

    /// Physical environments already deployed, from the artifact history
    #[serde(default)]
    pub cd_deployed: Vec<String>,

    /// Current environment is not part of the remaining plan
    #[serde(default)]
    pub skip_deploy: bool,

    /// Current environment is the last non-prod environment
    #[serde(default)]
    pub last_lower_env: bool,

    #[serde(default)]
    pub jira_id: String,

    #[serde(default)]
    pub sre_id: String,

    #[serde(default)]
    pub load_id: String,

    #[serde(default)]
    pub ada_id: String,

    #[serde(default)]
    pub crq_id: String,

    #[serde(default)]
    pub teams_channel: String,

    #[serde(default)]
    pub load_self_waived: bool,

    #[serde(default)]
    pub branch: String,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub qtest_folder: String,

    /// Physical environments that run regression tests
    #[serde(default)]
    pub regression: Vec<String>,

    /// Physical environments that run definition-of-done checks
    #[serde(default)]
    pub dod_envs: Vec<String>,

    #[serde(default)]
    pub arb_risk: bool,

    #[serde(default)]
    pub arb_risk_comment: String,

    #[serde(default)]
    pub fix_version: String,

    #[serde(default)]
    pub backout_artifact: Option<String>,

    #[serde(default)]
    pub appsec_result: String,

    #[serde(default = "default_release_type")]
    pub release_type: String,

    /// Release ticket needs updating (date or version drifted)
    #[serde(default)]
    pub update_release: bool,

    /// Content package to build; `None` when the released one is reused
    #[serde(default)]
    pub content: Option<ContentPackage>,

    /// Existing subtask statuses on the release ticket
    #[serde(default)]
    pub jira_subtasks: BTreeMap<String, SubtaskUpdate>,

    #[serde(default)]
    pub snow_details: Map<String, Value>,
}

impl Default for AutoDeploy {
    fn default() -> Self {
        Self {
            env_name: String::new(),
            env_id: String::new(),
            next_env: String::new(),
            next_env_name: String::new(),
            cd_deployed: Vec::new(),
            skip_deploy: false,
            last_lower_env: false,
            jira_id: String::new(),
            sre_id: String::new(),
            load_id: String::new(),
            ada_id: String::new(),
            crq_id: String::new(),
            teams_channel: String::new(),
            load_self_waived: false,
            branch: String::new(),
            region: String::new(),
            qtest_folder: String::new(),
            regression: Vec::new(),
            dod_envs: Vec::new(),
            arb_risk: false,
            arb_risk_comment: String::new(),
            fix_version: String::new(),
            backout_artifact: None,
            appsec_result: String::new(),
            release_type: default_release_type(),
            update_release: false,
            content: None,
            jira_subtasks: BTreeMap::new(),
            snow_details: Map::new(),
        }
    }
}

impl AutoDeploy {
    pub fn runs_regression(&self, env: &str) -> bool {
        self.regression.iter().any(|e| e == env)
    }

    pub fn runs_dod(&self, env: &str) -> bool {
        self.dod_envs.iter().any(|e| e == env)
    }
}
