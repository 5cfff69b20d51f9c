//! Rollback and post-deploy test decisions
//!
//! Pure functions over the deployment record. Stages feed them the record
//! and pipeline inputs and write the outcome back.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::models::deployment::{DeploymentData, OverallStatus};
use crate::models::operation::DeployOperation;
use crate::models::package::ModuleValues;

/// Allowed drop in critical passes between pre- and post-deploy runs
pub const DEFAULT_CRITICAL_TOLERANCE: i64 = 5;

/// Repository whose environment-sync jobs never run smoke tests
pub const ENV_SYNC_REPOSITORY: &str = "CDO-KP-ORG/ams-manifest-sync";

static FAILED_SMOKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(FAILURE|fail)").expect("valid regex"));

/// Why a rollback candidate was not rolled back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Operation never rolls back (test runs, dev, code quality, stage promotion)
    ExemptOperation,
    /// Auto-rollback turned off for the package
    Disabled,
    /// Nothing was deployed before, so there is nothing to roll back to
    NoArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    NotRequired,
    Skipped(SkipReason),
    Rollback,
}

impl RollbackDecision {
    pub fn is_rollback(&self) -> bool {
        matches!(self, RollbackDecision::Rollback)
    }
}

/// Inputs to the rollback decision
#[derive(Debug, Clone)]
pub struct RollbackFacts<'a> {
    pub operation: &'a DeployOperation,
    pub autorollback_enabled: bool,
    pub rollback_artifact: Option<&'a ModuleValues>,
    /// Deploy failed, or post-deploy tests failed
    pub deploy_failed: bool,
    pub critical_fail: bool,
}

impl<'a> RollbackFacts<'a> {
    pub fn from_record(record: &'a DeploymentData) -> Self {
        Self {
            operation: &record.operation,
            autorollback_enabled: record.autorollback_enabled(),
            rollback_artifact: record.deploy_package.rollback_artifact(),
            deploy_failed: record.deploy.failed(),
            critical_fail: record.post_deploy.critical_failed(),
        }
    }
}

/// Decide whether a deployment rolls back.
///
/// Exempt operations win over everything, then a disabled auto-rollback,
/// then a missing rollback artifact. Only a failure can trigger a rollback.
pub fn rollback_decision(facts: &RollbackFacts<'_>) -> RollbackDecision {
    if !(facts.deploy_failed || facts.critical_fail) {
        return RollbackDecision::NotRequired;
    }
    if facts.operation.is_rollback_exempt() {
        return RollbackDecision::Skipped(SkipReason::ExemptOperation);
    }
    if !facts.autorollback_enabled {
        return RollbackDecision::Skipped(SkipReason::Disabled);
    }
    if facts.rollback_artifact.is_none() {
        return RollbackDecision::Skipped(SkipReason::NoArtifact);
    }
    RollbackDecision::Rollback
}

/// Critical passes dropped by more than `tolerance` after the deployment
pub fn critical_regression(pre: Option<i64>, post: Option<i64>, tolerance: i64) -> bool {
    match (pre, post) {
        (Some(pre), Some(post)) if pre != 0 => pre > post + tolerance,
        _ => false,
    }
}

/// Result of the post-deploy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDeployOutcome {
    pub decision: RollbackDecision,
    pub comment: String,
}

/// Reconcile the deploy status and critical-test delta into a rollback scenario
pub fn evaluate_post_deploy(record: &DeploymentData, critical_fail: bool) -> PostDeployOutcome {
    let facts = RollbackFacts {
        critical_fail,
        ..RollbackFacts::from_record(record)
    };
    let decision = rollback_decision(&facts);
    let rollback_version = facts
        .rollback_artifact
        .and_then(|artifact| artifact.artifact_version.as_deref())
        .unwrap_or_default();

    let comment = match decision {
        _ if record.operation.is_rollback_exempt() => {
            format!("Rollback not enabled for {}.", record.operation)
        }
        RollbackDecision::Rollback if critical_fail => format!(
            "Critical test failure for {}. Rolled back to version {}. ",
            record.name, rollback_version
        ),
        RollbackDecision::Rollback => format!(
            "Deploy failed for {}. Rolled back to version {}. ",
            record.name, rollback_version
        ),
        RollbackDecision::Skipped(reason) => {
            let failure = if critical_fail { "Critical test failure" } else { "Deploy failed" };
            let why = match reason {
                SkipReason::Disabled => "rollback disabled",
                SkipReason::NoArtifact => "no rollback package found",
                SkipReason::ExemptOperation => "rollback not enabled for this operation",
            };
            format!("{} for {}. No rollback performed: {}.", failure, record.name, why)
        }
        RollbackDecision::NotRequired if record.deploy.skipped() => format!(
            "Deployment skipped for {}. Version already deployed in {}.",
            record.name, record.env
        ),
        RollbackDecision::NotRequired => {
            format!("Deployment successful for {} in {}.", record.name, record.env)
        }
    };

    info!("Post-deploy rollback decision: {:?}", decision);
    PostDeployOutcome { decision, comment }
}

/// Pipeline inputs that gate post-deploy testing
#[derive(Debug, Clone, Default)]
pub struct TestGateInputs {
    /// Smoke tests enabled for the pipeline
    pub smoke_tests: bool,

    /// Packages that carry their own test suite
    pub test_packages: Vec<String>,

    /// Job runs from the environment-sync repository
    pub env_sync_job: bool,

    /// Environment to vault mapping for the test runners
    pub vault_map: BTreeMap<String, Value>,
}

/// Post-deploy tests to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestPlan {
    pub smoke: bool,
    pub regression: bool,
    pub dod: bool,
    pub qtest_folder: String,
}

/// Decide which post-deploy tests run.
///
/// Smoke tests are skipped when a deploy or critical failure is already
/// recorded, since those go straight to rollback evaluation.
pub fn plan_post_deploy_tests(record: &DeploymentData, gate: &TestGateInputs) -> TestPlan {
    let operation = &record.operation;
    let promote_to_preprod = operation.is_promote_to_preprod();
    let promote_to_stage = operation.is_promote_to_stage();
    let test_included = gate.test_packages.iter().any(|name| *name == record.name);
    let skip_smoke_recorded = record.quality.as_ref().map(|q| q.skip_smoke).unwrap_or(false);

    let smoke = if !record.autorollback_enabled() {
        false
    } else if operation.is_run_tests() && test_included {
        true
    } else if !(promote_to_stage || gate.env_sync_job) {
        let skip_smoke = skip_smoke_recorded && !promote_to_preprod;
        let version_deployed = record.deploy.version_deployed.unwrap_or(false) && skip_smoke;
        gate.smoke_tests
            && !(record.deploy.failed()
                || record.post_deploy.critical_failed()
                || skip_smoke
                || record.deploy.rollback
                || version_deployed)
    } else {
        promote_to_stage && gate.smoke_tests
    };

    let auto_deploy = record.auto_deploy.as_ref();
    TestPlan {
        smoke,
        regression: auto_deploy.is_some_and(|cd| cd.runs_regression(&record.env)),
        dod: auto_deploy.is_some_and(|cd| cd.runs_dod(&record.env)),
        qtest_folder: auto_deploy.map(|cd| cd.qtest_folder.clone()).unwrap_or_default(),
    }
}

/// Statuses reported by the test runners
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestStatuses<'a> {
    pub smoke: &'a str,
    pub p1: &'a str,
    pub target: &'a str,
}

/// Nothing failed anywhere: deploy, critical, smoke, P1 or target tests
pub fn build_success(record: &DeploymentData, statuses: &TestStatuses<'_>) -> bool {
    !(FAILED_SMOKE.is_match(statuses.smoke)
        || record.deploy.failed()
        || statuses.p1.starts_with("fail")
        || statuses.target.starts_with("fail")
        || record.post_deploy.critical_failed())
}

/// Overall outcome of the post-deploy tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub overall_status: OverallStatus,
    /// Replacement comment; `None` keeps the existing one
    pub comment: Option<String>,
    /// A rollback has to be triggered now
    pub rollback_scenario: bool,
}

/// Fold the test results into the overall status.
///
/// Precedence: success when nothing failed; otherwise a missing rollback
/// artifact or disabled auto-rollback skip the rollback, and an eligible
/// rollback reports `rollback`. A failed deploy follows the same chain but
/// keeps the comment recorded by the post-deploy stage.
pub fn fold_test_outcome(record: &DeploymentData, success: bool) -> TestOutcome {
    if success {
        let comment = record
            .operation
            .is_promote_to_stage()
            .then(|| format!("Deployment successful for {} in {}.", record.name, record.env));
        return TestOutcome {
            overall_status: OverallStatus::Success,
            comment,
            rollback_scenario: false,
        };
    }

    let facts = RollbackFacts {
        deploy_failed: true,
        ..RollbackFacts::from_record(record)
    };
    let mut comment = "Post deployment test(s) failed. ".to_string();
    let (overall_status, rollback_scenario) = match facts.rollback_artifact {
        None => {
            comment.push_str(&format!(
                "Rollback package was not found or no rollback for operation: {}. ",
                record.operation
            ));
            (OverallStatus::SkippedRollback, false)
        }
        Some(_) if !facts.autorollback_enabled => {
            comment.push_str("Rollback disabled.");
            (OverallStatus::SkippedRollback, false)
        }
        Some(artifact) if rollback_decision(&facts).is_rollback() => {
            comment.push_str(&format!(
                "Rolled back to version {}. ",
                artifact.artifact_version.as_deref().unwrap_or_default()
            ));
            // Already rolled back by the post-deploy stage
            (OverallStatus::Rollback, !record.deploy.rollback)
        }
        Some(_) => {
            comment.push_str("No rollback for lower environments, stage or prod. ");
            (OverallStatus::SkippedRollback, false)
        }
    };

    // A failed deploy was already explained by the post-deploy stage
    let comment = match &record.post_deploy.comments {
        Some(_) if record.deploy.failed() => None,
        _ => Some(comment),
    };
    TestOutcome {
        overall_status,
        comment,
        rollback_scenario,
    }
}
