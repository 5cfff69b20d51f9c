//! Identity of the package being deployed

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DeployDataError;
use crate::models::de;

/// What the deployment does with the package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    #[default]
    Deploy,
    Rollback,
    Uninstall,
}

/// Artifact coordinates for a deploy or rollback target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleValues {
    #[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string", skip_serializing_if = "Option::is_none")]
    pub artifact_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_ids: Vec<String>,

    /// Keys added by other pipeline steps
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleValues {
    pub fn new(artifact_id: impl Into<String>, artifact_version: impl Into<String>) -> Self {
        Self {
            artifact_id: Some(artifact_id.into()),
            artifact_version: Some(artifact_version.into()),
            ..Default::default()
        }
    }

    /// An empty module (`{}`) means "no artifact"
    pub fn is_empty(&self) -> bool {
        self.artifact_id.is_none()
            && self.artifact_version.is_none()
            && self.secondary_ids.is_empty()
            && self.extra.is_empty()
    }
}

/// Previously deployed application, as recorded by the artifact repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastDeployed {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub app_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub app_version: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub app_path: Option<String>,
}

impl LastDeployed {
    pub fn is_empty(&self) -> bool {
        self.app_id.is_none() && self.app_version.is_none() && self.app_path.is_none()
    }
}

/// Request for an on-demand deployment that has no persisted record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnDemandRequest {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub artifact_id: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string")]
    pub artifact_version: Option<String>,

    #[serde(default)]
    pub path: BTreeMap<String, String>,
}

fn default_force_deploy() -> bool {
    true
}

/// Identity of what is being deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPackage {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub action: PackageAction,

    /// Primary artifact first, then secondary artifacts (SPA sub-modules)
    #[serde(default)]
    pub deploy_artifacts: Vec<String>,

    /// Artifact used for version comparisons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    #[serde(default)]
    pub module_values_deploy: ModuleValues,

    #[serde(default)]
    pub module_values_rollback: ModuleValues,

    /// Artifact id to last-known package path on the target servers
    #[serde(default)]
    pub path: BTreeMap<String, String>,

    /// Bypass the "version already deployed" skip
    #[serde(default = "default_force_deploy")]
    pub force_deploy: bool,

    /// Package is under continuous deployment
    #[serde(default, deserialize_with = "de::bool_lenient")]
    pub cd_deploy: bool,

    /// Intake keys carried through untouched (`app_props`, `jira`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DeploymentPackage {
    fn default() -> Self {
        Self {
            name: String::new(),
            action: PackageAction::Deploy,
            deploy_artifacts: Vec::new(),
            primary: None,
            module_values_deploy: ModuleValues::default(),
            module_values_rollback: ModuleValues::default(),
            path: BTreeMap::new(),
            force_deploy: true,
            cd_deploy: false,
            extra: Map::new(),
        }
    }
}

impl DeploymentPackage {
    /// Build from the intake map of a continuing flow
    pub fn from_value(value: Value) -> Result<Self, DeployDataError> {
        if !value.is_object() {
            return Err(DeployDataError::ConfigError(format!(
                "Deploy package must be a map, got: {}",
                value
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Build for an on-demand (rollback) flow with no persisted record
    pub fn on_demand(request: OnDemandRequest) -> Self {
        let artifact_id = request.artifact_id.clone().unwrap_or_default();
        let mut module = ModuleValues {
            artifact_id: request.artifact_id,
            artifact_version: request.artifact_version,
            ..Default::default()
        };
        module.extra.insert("result".to_string(), Value::Bool(false));

        Self {
            action: PackageAction::Deploy,
            name: request.name,
            module_values_deploy: module,
            deploy_artifacts: vec![artifact_id.clone()],
            primary: Some(artifact_id),
            path: request.path,
            ..Default::default()
        }
    }

    /// Set the rollback target and the artifact list from the last deployment
    pub fn attach_rollback(&mut self, last_deployed: &LastDeployed, secondary_artifacts: &[String]) {
        self.module_values_rollback = if last_deployed.is_empty() {
            ModuleValues::default()
        } else {
            ModuleValues {
                artifact_id: last_deployed.app_id.clone(),
                artifact_version: last_deployed.app_version.clone(),
                ..Default::default()
            }
        };

        let primary = self.module_values_deploy.artifact_id.clone().unwrap_or_default();
        let mut artifacts = vec![primary.clone()];
        artifacts.extend(
            secondary_artifacts
                .iter()
                .map(|coordinate| coordinate.split(':').next().unwrap_or_default().to_string()),
        );

        self.deploy_artifacts = artifacts;
        self.path = BTreeMap::from([(
            primary.clone(),
            last_deployed.app_path.clone().unwrap_or_default(),
        )]);
        self.primary = Some(primary);
    }

    /// Rollback target, if one exists
    pub fn rollback_artifact(&self) -> Option<&ModuleValues> {
        if self.module_values_rollback.is_empty() {
            None
        } else {
            Some(&self.module_values_rollback)
        }
    }

    pub fn deploy_version(&self) -> Option<&str> {
        self.module_values_deploy.artifact_version.as_deref()
    }

    pub fn is_primary(&self, artifact: &str) -> bool {
        self.primary.as_deref() == Some(artifact)
    }

    /// Configured notification map from the intake `app_props`
    pub fn notification_map(&self) -> Option<&Map<String, Value>> {
        self.extra
            .get("app_props")
            .and_then(|props| props.get("notification_map"))
            .and_then(Value::as_object)
    }

    /// Reporter of the manifest's Jira ticket
    pub fn jira_reporter(&self) -> Option<&str> {
        self.extra
            .get("jira")
            .and_then(|jira| jira.get("jira_reporter"))
            .and_then(Value::as_str)
    }
}
