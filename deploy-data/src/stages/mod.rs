//! Pipeline stages
//!
//! Each stage is one invocation of the binary: it loads the deployment
//! record, applies one transition and hands the record back to be persisted.

pub mod check_deploy_map;
pub mod create;
pub mod deploy;
pub mod deploy_data;
pub mod notifications;
pub mod post_deploy;

use std::fmt;
use std::str::FromStr;

use crate::deploy::fsm::StageEvent;
use crate::errors::DeployDataError;

/// Operation selected with `--operation` or `OPERATION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOperation {
    CreateDeployMap,
    Deploy,
    PostDeploy,
    CheckDeployMap,
    PostDeployTest,
    DeployData,
    AemNotifications,
}

impl StageOperation {
    pub const ALL: [StageOperation; 7] = [
        StageOperation::CreateDeployMap,
        StageOperation::Deploy,
        StageOperation::PostDeploy,
        StageOperation::CheckDeployMap,
        StageOperation::PostDeployTest,
        StageOperation::DeployData,
        StageOperation::AemNotifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageOperation::CreateDeployMap => "create-deploy-map",
            StageOperation::Deploy => "deploy",
            StageOperation::PostDeploy => "post-deploy",
            StageOperation::CheckDeployMap => "check-deploy-map",
            StageOperation::PostDeployTest => "post-deploy-test",
            StageOperation::DeployData => "deploy-data",
            StageOperation::AemNotifications => "aem-notifications",
        }
    }

    /// Lifecycle event applied to the record
    pub fn event(&self) -> StageEvent {
        match self {
            StageOperation::CreateDeployMap => StageEvent::Create,
            StageOperation::Deploy => StageEvent::Deploy,
            StageOperation::PostDeploy => StageEvent::PostDeploy,
            StageOperation::CheckDeployMap => StageEvent::CheckDeployMap,
            StageOperation::PostDeployTest => StageEvent::PostDeployTest,
            StageOperation::DeployData => StageEvent::DeployData,
            StageOperation::AemNotifications => StageEvent::Notify,
        }
    }
}

impl fmt::Display for StageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageOperation {
    type Err = DeployDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        StageOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| DeployDataError::ConfigError(format!("Operation not found: {}", s)))
    }
}
