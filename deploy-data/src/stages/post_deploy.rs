//! `post-deploy`: turn the deploy result and critical-test delta into a rollback scenario

use tracing::info;

use crate::decision::{self, DEFAULT_CRITICAL_TOLERANCE};
use crate::errors::DeployDataError;
use crate::models::deployment::DeploymentData;
use crate::outputs::Outputs;

/// Critical test results reported after the deployment
#[derive(Debug, Clone)]
pub struct CriticalInputs {
    /// Critical jobs passed after the deployment (`CRITICAL_POST.jobs_passed`)
    pub critical_post: Option<i64>,

    /// Allowed drop in passes before the deployment counts as broken
    pub tolerance: i64,
}

impl Default for CriticalInputs {
    fn default() -> Self {
        Self {
            critical_post: None,
            tolerance: DEFAULT_CRITICAL_TOLERANCE,
        }
    }
}

pub fn run(record: &mut DeploymentData, inputs: &CriticalInputs, outputs: &mut Outputs) -> Result<(), DeployDataError> {
    let critical_pre = record.quality()?.critical_pre;

    let critical_fail = decision::critical_regression(critical_pre, inputs.critical_post, inputs.tolerance);
    if critical_pre.is_some_and(|pre| pre != 0) {
        record.post_deploy.critical_post = inputs.critical_post;
    }
    record.post_deploy.critical_fail = Some(critical_fail);

    let outcome = decision::evaluate_post_deploy(record, critical_fail);
    let rollback_scenario = outcome.decision.is_rollback();
    record.post_deploy.comments = Some(outcome.comment);
    record.deploy.rollback = rollback_scenario;

    info!("Post-deploy rollback scenario: {}", rollback_scenario);
    outputs.set_bool("rollback-scenario", rollback_scenario);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::DeployStatus;
    use crate::models::package::{DeploymentPackage, ModuleValues};
    use crate::models::quality::QualitySnapshot;

    fn record(critical_pre: Option<i64>) -> DeploymentData {
        let package = DeploymentPackage {
            name: "foo".to_string(),
            module_values_deploy: ModuleValues::new("foo.ui", "2.0.0"),
            module_values_rollback: ModuleValues::new("foo.ui", "1.9.0"),
            ..Default::default()
        };
        let mut data = DeploymentData::new("qa1", "push event".into(), false, package);
        data.quality = Some(QualitySnapshot {
            autorollback_enabled: true,
            critical_pre,
            ..Default::default()
        });
        data
    }

    #[test]
    fn test_critical_drop_triggers_rollback() {
        let mut data = record(Some(40));
        let mut outputs = Outputs::new();
        let inputs = CriticalInputs {
            critical_post: Some(30),
            ..Default::default()
        };
        run(&mut data, &inputs, &mut outputs).unwrap();

        assert_eq!(data.post_deploy.critical_post, Some(30));
        assert_eq!(data.post_deploy.critical_fail, Some(true));
        assert!(data.deploy.rollback);
        assert_eq!(outputs.get("rollback-scenario"), Some("True"));
        assert!(data
            .post_deploy
            .comments
            .as_deref()
            .unwrap()
            .contains("Rolled back to version 1.9.0"));
    }

    #[test]
    fn test_clean_deploy() {
        let mut data = record(None);
        let mut outputs = Outputs::new();
        run(&mut data, &CriticalInputs::default(), &mut outputs).unwrap();

        assert_eq!(data.post_deploy.critical_post, None);
        assert_eq!(data.post_deploy.critical_fail, Some(false));
        assert!(!data.deploy.rollback);
        assert_eq!(outputs.get("rollback-scenario"), Some("False"));
    }

    #[test]
    fn test_rerun_is_stable() {
        let mut data = record(Some(40));
        data.deploy.deploy_status = Some(DeployStatus::Failed);
        let inputs = CriticalInputs {
            critical_post: Some(40),
            ..Default::default()
        };
        run(&mut data, &inputs, &mut Outputs::new()).unwrap();
        let first = data.clone();
        run(&mut data, &inputs, &mut Outputs::new()).unwrap();
        assert_eq!(data, first);
    }

    #[test]
    fn test_missing_quality_section() {
        let mut data = record(None);
        data.quality = None;
        let err = run(&mut data, &CriticalInputs::default(), &mut Outputs::new()).unwrap_err();
        assert!(matches!(err, DeployDataError::StateError(_)));
    }
}
