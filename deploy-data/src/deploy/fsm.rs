//! Lifecycle of a deployment record across pipeline stages

use serde::{Deserialize, Serialize};

/// Last stage completed on a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStage {
    /// Record built by create-deploy-map
    #[default]
    Created,

    /// Packages installed (or skipped) on the servers
    Deployed,

    /// Rollback scenario evaluated from deploy and critical results
    PostDeployed,

    /// Post-deploy test results folded into the overall status
    Tested,

    /// Notification payloads produced
    Notified,
}

/// Stage transition requested by a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Create,
    Deploy,
    /// Redeploy of the previous version after a failed deployment
    RollbackDeploy,
    PostDeploy,
    CheckDeployMap,
    PostDeployTest,
    DeployData,
    Notify,
}

/// Record lifecycle.
///
/// Every stage may be re-run (CI retries re-invoke the same step) and a stage
/// may follow any earlier one, since steps can be skipped by the workflow.
/// Moving back to an earlier stage is rejected; a rollback deploy keeps the
/// stage it runs after.
#[derive(Debug, Clone)]
pub struct RecordLifecycle {
    state: RecordStage,
}

impl RecordLifecycle {
    pub fn new(state: RecordStage) -> Self {
        Self { state }
    }

    /// Get current state
    pub fn state(&self) -> RecordStage {
        self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StageEvent) -> Result<(), String> {
        use RecordStage::*;

        let new_state = match (self.state, event) {
            // A fresh record always starts over
            (_, StageEvent::Create) => Created,

            // Read-mostly stages keep the current state
            (state, StageEvent::CheckDeployMap) | (state, StageEvent::DeployData) => state,

            (Created | Deployed, StageEvent::Deploy) => Deployed,
            (Created | Deployed, StageEvent::RollbackDeploy) => Deployed,
            // Rollbacks follow the stage that decided them
            (state @ (PostDeployed | Tested), StageEvent::RollbackDeploy) => state,
            (Created | Deployed | PostDeployed, StageEvent::PostDeploy) => PostDeployed,
            (Created | Deployed | PostDeployed | Tested, StageEvent::PostDeployTest) => Tested,
            (_, StageEvent::Notify) => Notified,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RecordLifecycle {
    fn default() -> Self {
        Self::new(RecordStage::Created)
    }
}
