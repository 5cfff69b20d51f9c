//! Deployment record persisted between pipeline stages

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deploy::fsm::RecordStage;
use crate::errors::DeployDataError;
use crate::models::auto_deploy::AutoDeploy;
use crate::models::de;
use crate::models::operation::DeployOperation;
use crate::models::package::DeploymentPackage;
use crate::models::quality::{QualitySnapshot, NOT_APPLICABLE};

/// Name of the dispatcher package that bypasses quality gating
pub const DISPATCHER_PACKAGE: &str = "ams-configs";

/// Result of the install step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeployStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployStatus::Success => "SUCCESS",
            DeployStatus::Failed => "FAILED",
            DeployStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// `deploy` section of the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_status: Option<DeployStatus>,

    /// A rollback is required (or was already performed) for this deployment
    #[serde(default, deserialize_with = "de::bool_lenient")]
    pub rollback: bool,

    /// The same or a newer version was already on the servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_deployed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_path: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DeployResult {
    fn default() -> Self {
        Self {
            deploy_status: Some(DeployStatus::Success),
            rollback: false,
            version_deployed: None,
            rollback_path: None,
            extra: Map::new(),
        }
    }
}

impl DeployResult {
    pub fn failed(&self) -> bool {
        self.deploy_status == Some(DeployStatus::Failed)
    }

    pub fn skipped(&self) -> bool {
        self.deploy_status == Some(DeployStatus::Skipped)
    }
}

/// Terminal outcome of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Rollback,
    SkippedRollback,
    Failure,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Rollback => "rollback",
            OverallStatus::SkippedRollback => "skipped_rollback",
            OverallStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `post_deploy` section of the record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDeploy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<OverallStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_post: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_fail: Option<bool>,

    /// Smoke test result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_result: Option<String>,

    /// Raw P1 tag result (`env~result~total` entries or `SKIPPED`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1_result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub p1_total_tests: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de::opt_string")]
    pub target_total_tests: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_test_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostDeploy {
    pub fn is_empty(&self) -> bool {
        *self == PostDeploy::default()
    }

    pub fn critical_failed(&self) -> bool {
        self.critical_fail.unwrap_or(false)
    }
}

fn not_applicable() -> String {
    NOT_APPLICABLE.to_string()
}

/// Aggregate deployment record, persisted as `package_deploy_map.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentData {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub env: String,

    #[serde(default)]
    pub manifest_deploy: bool,

    #[serde(default)]
    pub dispatcher_deploy: bool,

    #[serde(default)]
    pub operation: DeployOperation,

    #[serde(default = "not_applicable")]
    pub version: String,

    /// Last completed stage
    #[serde(default)]
    pub stage: RecordStage,

    #[serde(default)]
    pub quality: Option<QualitySnapshot>,

    #[serde(default)]
    pub auto_deploy: Option<AutoDeploy>,

    #[serde(default)]
    pub deploy: DeployResult,

    #[serde(default)]
    pub post_deploy: PostDeploy,

    #[serde(default)]
    pub deploy_package: DeploymentPackage,

    /// Keys written by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentData {
    /// Start a record for a package about to be deployed to `env`
    pub fn new(
        env: &str,
        operation: DeployOperation,
        manifest_deploy: bool,
        deploy_package: DeploymentPackage,
    ) -> Self {
        let name = deploy_package.name.clone();
        let version = deploy_package
            .deploy_version()
            .unwrap_or(NOT_APPLICABLE)
            .to_string();
        Self {
            dispatcher_deploy: name == DISPATCHER_PACKAGE,
            name,
            env: env.to_lowercase(),
            manifest_deploy,
            operation,
            version,
            stage: RecordStage::Created,
            quality: None,
            auto_deploy: None,
            deploy: DeployResult::default(),
            post_deploy: PostDeploy::default(),
            deploy_package,
            extra: Map::new(),
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, DeployDataError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_value(&self) -> Result<Value, DeployDataError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Quality section, required by every stage after creation
    pub fn quality(&self) -> Result<&QualitySnapshot, DeployDataError> {
        self.quality.as_ref().ok_or_else(|| {
            DeployDataError::StateError(format!("Deployment record for {} has no quality section", self.name))
        })
    }

    pub fn quality_mut(&mut self) -> Result<&mut QualitySnapshot, DeployDataError> {
        let name = self.name.clone();
        self.quality.as_mut().ok_or_else(|| {
            DeployDataError::StateError(format!("Deployment record for {} has no quality section", name))
        })
    }

    pub fn autorollback_enabled(&self) -> bool {
        self.quality
            .as_ref()
            .map(|q| q.autorollback_enabled)
            .unwrap_or(false)
    }

    pub fn is_cd(&self) -> bool {
        self.deploy_package.cd_deploy
    }
}
