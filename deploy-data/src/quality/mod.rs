//! Quality snapshot builder
//!
//! Resolves sonar, regression, security and AMS gate results for the artifact
//! being deployed into an immutable [`QualitySnapshot`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::errors::DeployDataError;
use crate::models::artifact::ArtifactProps;
use crate::models::de;
use crate::models::operation::DeployOperation;
use crate::models::quality::{QualitySnapshot, EXEMPT, NOT_APPLICABLE};

static PASSING_GATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(OK|SKIPPED|EXEMPT|PASS)$").expect("valid regex"));

static PASSING_SMOKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(success|pass)").expect("valid regex"));

/// Exception keys recognised in the exception status map
pub const SONAR_GATE: &str = "sonar";
pub const REGRESSION_GATE: &str = "regression_quality_gate";
pub const AMS_GATE: &str = "ams_code_quality";
pub const AUTOROLLBACK_GATE: &str = "auto_rollback";

/// Inputs read from the pipeline environment
#[derive(Debug, Clone, Default)]
pub struct QualityInputs {
    /// Gate name to "enforced" flag; an explicit false means the gate is exempt
    pub exception_status: BTreeMap<String, Value>,

    /// Gate name to exception expiration date
    pub expiration_status: BTreeMap<String, Value>,

    /// Regression quality properties (`threshold-result`)
    pub regression_props: BTreeMap<String, Value>,

    /// Artifact repository properties; `None` when none were supplied
    pub artifact_props: Option<ArtifactProps>,

    /// Critical tests passed before the deployment
    pub critical_pre: Option<i64>,

    /// Global switch turning auto-rollback off
    pub auto_disable: bool,
}

impl QualityInputs {
    /// Gate is enforced unless the exception map explicitly says otherwise
    fn enforced(&self, gate: &str) -> bool {
        self.exception_status.get(gate).map(de::truthy).unwrap_or(true)
    }

    fn expiration(&self, gate: &str) -> String {
        self.expiration_status
            .get(gate)
            .and_then(de::scalar_string)
            .unwrap_or_else(|| NOT_APPLICABLE.to_string())
    }

    fn regression_threshold(&self) -> Option<String> {
        self.regression_props.get("threshold-result").and_then(de::scalar_string)
    }
}

/// What is being deployed, and where
#[derive(Debug, Clone)]
pub struct QualityContext<'a> {
    pub package_name: &'a str,
    pub env: &'a str,
    pub operation: &'a DeployOperation,
    pub manifest_deploy: bool,
    pub dispatcher_deploy: bool,
}

/// Build the quality snapshot for the current artifact and environment
pub fn build_snapshot(
    inputs: &QualityInputs,
    ctx: &QualityContext<'_>,
) -> Result<QualitySnapshot, DeployDataError> {
    if ctx.dispatcher_deploy {
        info!("Dispatcher package {}: quality gates exempt", ctx.package_name);
        return Ok(QualitySnapshot::exempt());
    }

    let props = match &inputs.artifact_props {
        Some(props) if !props.is_empty() => props,
        _ => {
            return Err(DeployDataError::ConfigError(format!(
                "Artifact properties not found for {}",
                ctx.package_name
            )))
        }
    };

    let autorollback = if inputs.enforced(AUTOROLLBACK_GATE) {
        NOT_APPLICABLE
    } else {
        EXEMPT
    };
    let autorollback_enabled = autorollback_enabled(autorollback == EXEMPT, inputs.auto_disable, ctx.package_name);
    info!("Autorollback result: {} (enabled: {})", autorollback, autorollback_enabled);

    let sonar = if inputs.enforced(SONAR_GATE) {
        props.first_or("SONAR_QUALITY_GATE", "NOT_FOUND")
    } else {
        EXEMPT.to_string()
    };
    let regression = if inputs.enforced(REGRESSION_GATE) {
        inputs.regression_threshold().unwrap_or_else(|| "FAIL".to_string())
    } else {
        EXEMPT.to_string()
    };
    let ams = if inputs.enforced(AMS_GATE) {
        props.first_or("AMS_CODE_QUALITY", NOT_APPLICABLE)
    } else {
        EXEMPT.to_string()
    };
    let regression_date = inputs
        .expiration(REGRESSION_GATE)
        .split(' ')
        .next()
        .unwrap_or(NOT_APPLICABLE)
        .to_string();

    let (skip_critical, skip_smoke) = prior_test_passes(props, ctx.env, ctx.operation);

    let mut snapshot = QualitySnapshot {
        sonar,
        sonar_date: inputs.expiration(SONAR_GATE),
        autorollback: autorollback.to_string(),
        autorollback_date: inputs.expiration(AUTOROLLBACK_GATE),
        autorollback_enabled,
        regression,
        regression_enabled: regression_date != NOT_APPLICABLE,
        regression_date,
        regression_pass: inputs
            .regression_threshold()
            .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        ams,
        skip_critical,
        skip_smoke,
        sre_slo_id: props.first_or("SRE_SLO_ID", NOT_APPLICABLE),
        synthetic_id: props.first_or("SYNTHETIC_ID", NOT_APPLICABLE),
        nexus_id: props.first_or("NEXUS_ID", ""),
        checkmarx_id: props.first_or("CHECKMARX_ID", ""),
        branch: props.first_or("GIT_BRANCH", ""),
        critical_pre: inputs.critical_pre,
        core_name: props.first("PROJECT_CORE_NAME").map(str::to_string),
        ..Default::default()
    };

    if ctx.manifest_deploy {
        snapshot.quality_fail = quality_failed(&snapshot);
    }

    Ok(snapshot)
}

/// Config packages and globally disabled pipelines never roll back automatically
pub fn autorollback_enabled(exempt: bool, auto_disable: bool, package_name: &str) -> bool {
    !(exempt || auto_disable || package_name.ends_with("-config"))
}

/// Critical and smoke passes already recorded for `env`.
///
/// Promotions to stage or preprod always skip the critical re-test.
pub fn prior_test_passes(props: &ArtifactProps, env: &str, operation: &DeployOperation) -> (bool, bool) {
    let mut critical_passed = props.env_history_passed("CRITICAL_TEST", env, |result| result == "pass");
    if critical_passed {
        info!("Artifact already passed critical tests in {}", env);
    }
    if operation.is_higher_env_promotion() {
        critical_passed = true;
    }

    let smoke_passed = props.env_history_passed("SMOKE", env, |result| {
        PASSING_SMOKE.is_match(&result.to_lowercase())
    });
    if smoke_passed {
        info!("Artifact already passed smoke tests in {}", env);
    }

    (critical_passed, smoke_passed)
}

/// Any of sonar, regression or AMS not in a passing state
pub fn quality_failed(snapshot: &QualitySnapshot) -> bool {
    [&snapshot.sonar, &snapshot.regression, &snapshot.ams]
        .iter()
        .any(|result| !PASSING_GATE.is_match(&result.to_uppercase()))
}
