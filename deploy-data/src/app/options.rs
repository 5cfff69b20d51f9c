//! Application configuration options
//!
//! Every pipeline input is parsed once from the environment snapshot into
//! typed options. Components receive the part they need by reference.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::app::env::EnvVars;
use crate::decision::{TestGateInputs, ENV_SYNC_REPOSITORY};
use crate::deploy::executor::DeployInputs;
use crate::errors::DeployDataError;
use crate::filesys::file::File;
use crate::models::de;
use crate::models::operation::DeployOperation;
use crate::models::package::LastDeployed;
use crate::progression::release::ReleaseInputs;
use crate::progression::resolver::CdInputs;
use crate::quality::QualityInputs;
use crate::stages::notifications::NotifyInputs;
use crate::stages::post_deploy::CriticalInputs;
use crate::stages::post_deploy_test::TestResultInputs;
use crate::stages::StageOperation;
use crate::storage::layout::WorkspaceLayout;

/// Release dates are compared in Pacific standard time
const RELEASE_UTC_OFFSET_HOURS: i64 = -8;

const DEFAULT_DEPLOY_OPERATION: &str = "push event";

/// `{jobs_passed: N}` summary of a critical test run
#[derive(Debug, Clone, Default, Deserialize)]
struct CriticalSummary {
    #[serde(default, deserialize_with = "de::opt_i64")]
    jobs_passed: Option<i64>,
}

/// Environment map of the test runners (`AEM_ENV_MAP`)
#[derive(Debug, Clone, Default, Deserialize)]
struct AemEnvMap {
    #[serde(default)]
    vault_map: BTreeMap<String, Value>,
}

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Stage to run
    pub operation: StageOperation,

    pub layout: WorkspaceLayout,

    /// Step output file (`GITHUB_OUTPUT`)
    pub output_file: Option<File>,

    /// Deploy target, lowercased
    pub deploy_env: String,

    pub deploy_operation: DeployOperation,

    pub manifest_deploy: bool,

    /// Intake map of the package (`DEPLOY_PACKAGE`)
    pub deploy_package: Value,

    pub last_deployed: LastDeployed,

    /// Release dates are validated against this day
    pub today: NaiveDate,

    pub quality: QualityInputs,
    pub cd: CdInputs,
    pub release: ReleaseInputs,
    pub critical: CriticalInputs,
    pub test_gate: TestGateInputs,
    pub test_results: TestResultInputs,
    pub notify: NotifyInputs,
    pub deploy: DeployInputs,
}

impl AppOptions {
    /// Parse every input from the environment.
    ///
    /// `operation` overrides `OPERATION` (the `--operation` argument).
    pub fn from_env(env: &EnvVars, operation: Option<&str>) -> Result<Self, DeployDataError> {
        let operation = operation
            .or_else(|| env.get("OPERATION"))
            .ok_or_else(|| DeployDataError::ConfigError("Operation not set".to_string()))?
            .parse::<StageOperation>()?;

        let workspace = env
            .get("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let cd = cd_inputs(env)?;

        Ok(Self {
            operation,
            layout: WorkspaceLayout::new(workspace),
            output_file: env.get("GITHUB_OUTPUT").map(File::new),
            deploy_env: env.get_or("DEPLOY_ENV", "").to_lowercase(),
            deploy_operation: DeployOperation::new(env.get_or("DEPLOY_OPERATION", DEFAULT_DEPLOY_OPERATION)),
            manifest_deploy: env.present("MANIFEST_DEPLOY"),
            deploy_package: env.yaml("DEPLOY_PACKAGE")?,
            last_deployed: env.yaml("LAST_DEPLOYED")?,
            today: release_today(),
            quality: quality_inputs(env)?,
            release: ReleaseInputs {
                release_record: env.yaml("RELEASE_RECORD")?,
                appsec_result: env.yaml("APPSEC_RESULT")?,
            },
            critical: CriticalInputs {
                critical_post: env.yaml::<CriticalSummary>("CRITICAL_POST")?.jobs_passed,
                ..Default::default()
            },
            test_gate: TestGateInputs {
                smoke_tests: env.flag("SMOKE_TEST"),
                test_packages: env.yaml("TEST_PACKAGES")?,
                env_sync_job: env.get("GITHUB_REPOSITORY") == Some(ENV_SYNC_REPOSITORY),
                vault_map: env.yaml::<AemEnvMap>("AEM_ENV_MAP")?.vault_map,
            },
            test_results: test_result_inputs(env),
            notify: NotifyInputs {
                cd_status: env.get("TEST_RESULT").map(str::to_string),
                build_url: env.get("BUILD_URL").map(str::to_string),
                has_artifact_props: env.present("ARTIFACTORY_PROP"),
                actor: env.get_or("GITHUB_ACTOR", ""),
            },
            deploy: DeployInputs {
                vault_map: env.yaml("VAULT_MAP")?,
                artifact_paths: env.string_map("ARTIFACT_PATH")?,
                insecure_tls: env.flag("AEM_INSECURE_TLS"),
                ..DeployInputs::with_defaults()
            },
            cd,
        })
    }
}

/// Current day at the release offset
pub fn release_today() -> NaiveDate {
    (Utc::now() + Duration::hours(RELEASE_UTC_OFFSET_HOURS)).date_naive()
}

fn quality_inputs(env: &EnvVars) -> Result<QualityInputs, DeployDataError> {
    let artifact_props = match env.get("ARTIFACTORY_PROP") {
        Some(_) => Some(env.yaml("ARTIFACTORY_PROP")?),
        None => None,
    };
    Ok(QualityInputs {
        exception_status: env.yaml("EXCEPTION_STATUS")?,
        expiration_status: env.yaml("EXPIRATION_STATUS")?,
        regression_props: env.yaml("REGRESSION_QUALITY_PROPS")?,
        artifact_props,
        critical_pre: env.yaml::<CriticalSummary>("CRITICAL_PRE")?.jobs_passed,
        auto_disable: env.flag("AUTO_DISABLE"),
    })
}

fn cd_inputs(env: &EnvVars) -> Result<CdInputs, DeployDataError> {
    Ok(CdInputs {
        environment_mapping: env
            .string_map("AEM_CD_ENVIRONMENT_MAPPING")?
            .into_iter()
            .map(|(tier, envs)| (tier.to_lowercase(), envs))
            .collect(),
        check_env_map: env.string_map("AEM_CHECK_ENV_MAP")?,
        jira_mappings: env.string_map("AEM_CD_JIRA_MAPPINGS")?,
    })
}

fn test_result_inputs(env: &EnvVars) -> TestResultInputs {
    let defaults = TestResultInputs::default();
    TestResultInputs {
        test_result: env.get_or("TEST_RESULT", &defaults.test_result),
        regression_result: env.get_or("REGRESSION_RESULT", &defaults.regression_result),
        p1_result: env.get_or("P1_RESULT", &defaults.p1_result),
        target_result: env.get_or("TARGET_RESULT", &defaults.target_result),
        test_url: env.get("TEST_URL").map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let env = EnvVars::from_pairs([("OPERATION", "post-deploy"), ("DEPLOY_ENV", "QA1")]);
        let options = AppOptions::from_env(&env, None).unwrap();
        assert_eq!(options.operation, StageOperation::PostDeploy);
        assert_eq!(options.deploy_env, "qa1");
        assert_eq!(options.deploy_operation.as_str(), "push event");
        assert!(!options.manifest_deploy);
        assert!(options.output_file.is_none());
        assert!(options.quality.artifact_props.is_none());
        assert_eq!(options.critical.tolerance, 5);
        assert_eq!(options.test_results.test_result, "SKIPPED");
        assert_eq!(options.deploy.confirm_checks, 10);
    }

    #[test]
    fn test_operation_override_and_inputs() {
        let env = EnvVars::from_pairs([
            ("OPERATION", "deploy"),
            ("MANIFEST_DEPLOY", "manifest.yaml"),
            ("CRITICAL_PRE", "{jobs_passed: 40}"),
            ("CRITICAL_POST", "{jobs_passed: '31'}"),
            ("SMOKE_TEST", "true"),
            ("GITHUB_REPOSITORY", ENV_SYNC_REPOSITORY),
            ("AEM_ENV_MAP", "vault_map: {qa1: {path: secret/qa1}}"),
            ("AEM_CD_ENVIRONMENT_MAPPING", "HINT: hint1\nDEV: dev1"),
            ("ARTIFACTORY_PROP", "SMOKE: [qa1~pass]"),
        ]);
        let options = AppOptions::from_env(&env, Some("check-deploy-map")).unwrap();
        assert_eq!(options.operation, StageOperation::CheckDeployMap);
        assert!(options.manifest_deploy);
        assert_eq!(options.quality.critical_pre, Some(40));
        assert_eq!(options.critical.critical_post, Some(31));
        assert!(options.test_gate.smoke_tests && options.test_gate.env_sync_job);
        assert!(options.test_gate.vault_map.contains_key("qa1"));
        assert_eq!(options.cd.environment_mapping["hint"], "hint1");
        assert!(options.quality.artifact_props.is_some());
    }

    #[test]
    fn test_missing_operation() {
        let err = AppOptions::from_env(&EnvVars::default(), None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_input() {
        let env = EnvVars::from_pairs([("OPERATION", "post-deploy"), ("LAST_DEPLOYED", "{app_id: [")]);
        assert!(matches!(
            AppOptions::from_env(&env, None).unwrap_err(),
            DeployDataError::ConfigError(_)
        ));
    }
}
