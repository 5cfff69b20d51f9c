//! Record lifecycle tests

use deploy_data::deploy::fsm::{RecordLifecycle, RecordStage, StageEvent};
use deploy_data::stages::StageOperation;

#[test]
fn test_lifecycle_initial_state() {
    let lifecycle = RecordLifecycle::default();
    assert_eq!(lifecycle.state(), RecordStage::Created);
}

#[test]
fn test_lifecycle_full_pipeline() {
    let mut lifecycle = RecordLifecycle::default();

    for operation in StageOperation::ALL {
        lifecycle.process(operation.event()).unwrap();
    }
    assert_eq!(lifecycle.state(), RecordStage::Notified);
}

#[test]
fn test_lifecycle_stage_retries() {
    let mut lifecycle = RecordLifecycle::new(RecordStage::Deployed);

    // CI retries re-run the same step
    lifecycle.process(StageEvent::Deploy).unwrap();
    lifecycle.process(StageEvent::Deploy).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::Deployed);

    lifecycle.process(StageEvent::PostDeployTest).unwrap();
    lifecycle.process(StageEvent::PostDeployTest).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::Tested);
}

#[test]
fn test_lifecycle_skipped_steps() {
    // Deploy skipped by the workflow: post-deploy straight after create
    let mut lifecycle = RecordLifecycle::default();
    lifecycle.process(StageEvent::PostDeploy).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::PostDeployed);

    // Notifications may follow any stage
    let mut lifecycle = RecordLifecycle::default();
    lifecycle.process(StageEvent::Notify).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::Notified);
}

#[test]
fn test_lifecycle_read_only_stages_keep_state() {
    let mut lifecycle = RecordLifecycle::new(RecordStage::Notified);
    lifecycle.process(StageEvent::DeployData).unwrap();
    lifecycle.process(StageEvent::CheckDeployMap).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::Notified);
}

#[test]
fn test_lifecycle_rejects_going_back() {
    let mut lifecycle = RecordLifecycle::new(RecordStage::Notified);
    assert!(lifecycle.process(StageEvent::Deploy).is_err());
    assert!(lifecycle.process(StageEvent::PostDeployTest).is_err());
    assert_eq!(lifecycle.state(), RecordStage::Notified);

    // A new record always starts over
    lifecycle.process(StageEvent::Create).unwrap();
    assert_eq!(lifecycle.state(), RecordStage::Created);
}

#[test]
fn test_stage_serialization() {
    assert_eq!(
        serde_json::to_value(RecordStage::PostDeployed).unwrap(),
        serde_json::json!("post-deployed")
    );
    let stage: RecordStage = serde_json::from_str("\"tested\"").unwrap();
    assert_eq!(stage, RecordStage::Tested);
}
