//! Stage tests: quality snapshot and full pipeline runs over a workspace

use std::collections::BTreeMap;
use std::path::Path;

use deploy_data::app::env::EnvVars;
use deploy_data::app::options::AppOptions;
use deploy_data::app::run::run;
use deploy_data::deploy::fsm::RecordStage;
use deploy_data::errors::DeployDataError;
use deploy_data::models::artifact::ArtifactProps;
use deploy_data::models::deployment::{DeploymentData, OverallStatus};
use deploy_data::models::operation::DeployOperation;
use deploy_data::quality::{build_snapshot, QualityContext, QualityInputs};
use deploy_data::storage::layout::DEPLOY_MAP_FILE;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn artifact_props() -> ArtifactProps {
    ArtifactProps::new(BTreeMap::from([
        ("SONAR_QUALITY_GATE".to_string(), vec!["OK".to_string()]),
        ("AMS_CODE_QUALITY".to_string(), vec!["PASSED".to_string()]),
    ]))
}

fn quality_ctx<'a>(name: &'a str, operation: &'a DeployOperation) -> QualityContext<'a> {
    QualityContext {
        package_name: name,
        env: "qa1",
        operation,
        manifest_deploy: false,
        dispatcher_deploy: false,
    }
}

#[test]
fn test_sonar_exception_is_exempt() {
    let inputs = QualityInputs {
        exception_status: BTreeMap::from([("sonar".to_string(), json!(false))]),
        artifact_props: Some(artifact_props()),
        ..Default::default()
    };
    let operation = DeployOperation::new("deploy");

    let snapshot = build_snapshot(&inputs, &quality_ctx("foo", &operation)).unwrap();
    assert_eq!(snapshot.sonar, "EXEMPT");
    assert!(snapshot.autorollback_enabled);
}

#[test]
fn test_config_packages_never_auto_rollback() {
    let inputs = QualityInputs {
        artifact_props: Some(artifact_props()),
        ..Default::default()
    };
    let operation = DeployOperation::new("deploy");

    let snapshot = build_snapshot(&inputs, &quality_ctx("foo-config", &operation)).unwrap();
    assert_eq!(snapshot.sonar, "OK");
    assert!(!snapshot.autorollback_enabled);
}

#[test]
fn test_missing_artifact_props() {
    let operation = DeployOperation::new("deploy");
    let err = build_snapshot(&QualityInputs::default(), &quality_ctx("foo", &operation)).unwrap_err();
    assert!(matches!(err, DeployDataError::ConfigError(_)));
}

/// Pipeline environment rooted in a temporary workspace
struct Workspace {
    dir: TempDir,
    env: EnvVars,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let output = dir.path().join("github_output").to_string_lossy().to_string();
        let env = EnvVars::from_pairs([
            ("GITHUB_WORKSPACE", base.as_str()),
            ("GITHUB_OUTPUT", output.as_str()),
            ("GITHUB_ACTOR", "jdoe"),
            ("DEPLOY_ENV", "QA1"),
            ("DEPLOY_OPERATION", "deploy"),
            (
                "DEPLOY_PACKAGE",
                "{name: foo, module_values_deploy: {artifact_id: foo.ui, artifact_version: 2.0.0}}",
            ),
            ("LAST_DEPLOYED", "{app_id: foo.ui, app_version: 1.9.0}"),
            ("ARTIFACTORY_PROP", "{SONAR_QUALITY_GATE: [OK], AMS_CODE_QUALITY: [PASSED]}"),
        ]);
        Self { dir, env }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn run(&self, operation: &str) -> Result<DeploymentData, DeployDataError> {
        let options = AppOptions::from_env(&self.env, Some(operation))?;
        run(&options).await.map(|report| report.record)
    }

    fn record_file(&self) -> String {
        std::fs::read_to_string(self.path().join(DEPLOY_MAP_FILE)).unwrap()
    }

    fn outputs(&self) -> String {
        std::fs::read_to_string(self.path().join("github_output")).unwrap_or_default()
    }
}

#[tokio::test]
async fn test_pipeline_without_deploy_step() {
    let workspace = Workspace::new();

    let created = workspace.run("create-deploy-map").await.unwrap();
    assert_eq!(created.stage, RecordStage::Created);
    assert_eq!(created.env, "qa1");
    assert_eq!(
        created.deploy_package.module_values_rollback.artifact_version.as_deref(),
        Some("1.9.0")
    );
    assert!(workspace.outputs().contains("rollback-enabled=True"));

    let post_deployed = workspace.run("post-deploy").await.unwrap();
    assert_eq!(post_deployed.stage, RecordStage::PostDeployed);
    assert_eq!(
        post_deployed.post_deploy.comments.as_deref(),
        Some("Deployment successful for foo in qa1.")
    );
    assert!(!post_deployed.deploy.rollback);

    workspace.run("check-deploy-map").await.unwrap();
    assert!(workspace.outputs().contains("run-tests="));

    let tested = workspace.run("post-deploy-test").await.unwrap();
    assert_eq!(tested.stage, RecordStage::Tested);
    assert_eq!(tested.post_deploy.overall_status, Some(OverallStatus::Success));

    workspace.run("deploy-data").await.unwrap();
    assert!(workspace.outputs().contains("deploy-props="));

    let notified = workspace.run("aem-notifications").await.unwrap();
    assert_eq!(notified.stage, RecordStage::Notified);

    let persisted = DeploymentData::from_json(&workspace.record_file()).unwrap();
    assert_eq!(persisted.stage, RecordStage::Notified);
    assert_eq!(persisted.post_deploy.overall_status, Some(OverallStatus::Success));
    assert_eq!(persisted.quality, notified.quality);
}

#[tokio::test]
async fn test_rerun_post_deploy_is_idempotent() {
    let workspace = Workspace::new();
    workspace.run("create-deploy-map").await.unwrap();

    workspace.run("post-deploy").await.unwrap();
    let first = workspace.record_file();
    workspace.run("post-deploy").await.unwrap();
    assert_eq!(workspace.record_file(), first);
}

#[tokio::test]
async fn test_failed_stage_persists_nothing() {
    let workspace = Workspace::new();

    let err = workspace.run("post-deploy").await.unwrap_err();
    assert!(matches!(err, DeployDataError::StateError(_)));
    assert!(!workspace.path().join(DEPLOY_MAP_FILE).exists());
    assert_eq!(workspace.outputs(), "");

    workspace.run("create-deploy-map").await.unwrap();
    workspace.run("post-deploy-test").await.unwrap();
    let tested = workspace.record_file();

    // Going back to an earlier stage is rejected and leaves the record untouched
    let err = workspace.run("post-deploy").await.unwrap_err();
    assert!(matches!(err, DeployDataError::StateError(_)));
    assert_eq!(workspace.record_file(), tested);
}

#[tokio::test]
async fn test_cd_package_requires_release_config() {
    let mut workspace = Workspace::new();
    workspace.env.set(
        "DEPLOY_PACKAGE",
        "{name: foo, cd_deploy: true, module_values_deploy: {artifact_id: foo.ui, artifact_version: 2.0.0}}",
    );

    let err = workspace.run("create-deploy-map").await.unwrap_err();
    assert!(matches!(err, DeployDataError::ConfigError(_)));
    assert!(!workspace.path().join(DEPLOY_MAP_FILE).exists());
}

#[tokio::test]
async fn test_cd_package_progression() {
    let mut workspace = Workspace::new();
    workspace.env.set(
        "DEPLOY_PACKAGE",
        "{name: foo, cd_deploy: true, module_values_deploy: {artifact_id: foo.ui, artifact_version: 2.0.0}}",
    );
    workspace.env.set("AEM_CD_ENVIRONMENT_MAPPING", "DEV: dev1");
    workspace.env.set(
        "ARTIFACTORY_PROP",
        "{SONAR_QUALITY_GATE: [OK], CONTINUOUS_DEPLOY: [dev1], TEAMS_CHANNEL: [foo-team]}",
    );
    std::fs::write(
        workspace.path().join("ReleaseReadinessConfig.yaml"),
        "jiraDetails:\n  fixVersion: \"2027.1\"\n  environments:\n    DEV: true\n    QA: \"qa1,qa2\"\n",
    )
    .unwrap();

    let created = workspace.run("create-deploy-map").await.unwrap();
    let auto_deploy = created.auto_deploy.unwrap();
    assert_eq!(auto_deploy.env_name, "QA");
    assert_eq!(auto_deploy.next_env, "qa2");
    assert_eq!(auto_deploy.teams_channel, "foo-team");
    assert!(!auto_deploy.last_lower_env);
    assert!(workspace.outputs().contains("deploy-data="));
}

#[tokio::test]
async fn test_rollback_deploy_after_critical_failure() {
    let mut workspace = Workspace::new();
    workspace.env.set("CRITICAL_PRE", "{jobs_passed: 40}");
    workspace.run("create-deploy-map").await.unwrap();

    workspace.env.set("CRITICAL_POST", "{jobs_passed: 20}");
    let post_deployed = workspace.run("post-deploy").await.unwrap();
    assert!(post_deployed.deploy.rollback);
    assert!(workspace.outputs().contains("rollback-scenario=True"));

    // The rollback job redeploys the previous version against the persisted record
    workspace.env.set("DEPLOY_OPERATION", "rollback");
    let rolled_back = workspace.run("deploy").await.unwrap();
    assert_eq!(rolled_back.stage, RecordStage::PostDeployed);
    assert!(rolled_back.deploy.rollback);
    assert!(!rolled_back.deploy.failed());
    assert_eq!(rolled_back.operation.as_str(), "deploy");

    let tested = workspace.run("post-deploy-test").await.unwrap();
    assert_eq!(tested.post_deploy.overall_status, Some(OverallStatus::Rollback));
    assert!(tested
        .post_deploy
        .comments
        .as_deref()
        .is_some_and(|comment| comment.contains("Rolled back to version 1.9.0")));
}
