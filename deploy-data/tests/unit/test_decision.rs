//! Rollback decision tests

use deploy_data::decision::{evaluate_post_deploy, rollback_decision, RollbackDecision, RollbackFacts, SkipReason};
use deploy_data::models::deployment::{DeployStatus, DeploymentData};
use deploy_data::models::operation::DeployOperation;
use deploy_data::models::package::{DeploymentPackage, ModuleValues};
use deploy_data::models::quality::QualitySnapshot;

fn record(operation: &str, rollback: Option<ModuleValues>, autorollback: bool) -> DeploymentData {
    let package = DeploymentPackage {
        name: "foo".to_string(),
        module_values_deploy: ModuleValues::new("x", "2.0.0"),
        module_values_rollback: rollback.unwrap_or_default(),
        ..Default::default()
    };
    let mut data = DeploymentData::new("qa1", operation.into(), false, package);
    data.quality = Some(QualitySnapshot {
        autorollback_enabled: autorollback,
        ..Default::default()
    });
    data
}

#[test]
fn test_run_tests_failure_does_not_roll_back() {
    let mut data = record("run-tests", Some(ModuleValues::new("x", "1.2.0")), true);
    data.deploy.deploy_status = Some(DeployStatus::Failed);

    let outcome = evaluate_post_deploy(&data, false);
    assert!(!outcome.decision.is_rollback());
    assert_eq!(outcome.decision, RollbackDecision::Skipped(SkipReason::ExemptOperation));
}

#[test]
fn test_failed_deploy_rolls_back_to_previous_version() {
    let mut data = record("deploy", Some(ModuleValues::new("x", "1.2.0")), true);
    data.deploy.deploy_status = Some(DeployStatus::Failed);

    let outcome = evaluate_post_deploy(&data, false);
    assert_eq!(outcome.decision, RollbackDecision::Rollback);
    assert!(outcome.comment.contains("Rolled back to version 1.2.0"));
}

#[test]
fn test_critical_failure_rolls_back() {
    let data = record("push event", Some(ModuleValues::new("x", "1.2.0")), true);

    let outcome = evaluate_post_deploy(&data, true);
    assert!(outcome.decision.is_rollback());
    assert!(outcome.comment.starts_with("Critical test failure for foo."));
}

#[test]
fn test_decision_precedence() {
    let artifact = ModuleValues::new("x", "1.2.0");
    let operations = ["run-tests", "deploy-to-dev", "ams-code-quality", "promote-to-stage", "deploy", "push event"];

    for name in operations {
        let operation = DeployOperation::new(name);
        for autorollback_enabled in [true, false] {
            for has_artifact in [true, false] {
                for deploy_failed in [true, false] {
                    for critical_fail in [true, false] {
                        let facts = RollbackFacts {
                            operation: &operation,
                            autorollback_enabled,
                            rollback_artifact: has_artifact.then_some(&artifact),
                            deploy_failed,
                            critical_fail,
                        };
                        let expected = if !(deploy_failed || critical_fail) {
                            RollbackDecision::NotRequired
                        } else if operation.is_rollback_exempt() {
                            RollbackDecision::Skipped(SkipReason::ExemptOperation)
                        } else if !autorollback_enabled {
                            RollbackDecision::Skipped(SkipReason::Disabled)
                        } else if !has_artifact {
                            RollbackDecision::Skipped(SkipReason::NoArtifact)
                        } else {
                            RollbackDecision::Rollback
                        };
                        assert_eq!(rollback_decision(&facts), expected, "{:?}", facts);
                    }
                }
            }
        }
    }
}

#[test]
fn test_exempt_operations_match_by_prefix() {
    assert!(DeployOperation::new("promote-to-stage-hotfix").is_rollback_exempt());
    assert!(DeployOperation::new("run-tests-regression").is_rollback_exempt());
    assert!(!DeployOperation::new("promote-to-preprod").is_rollback_exempt());
}
