//! `create-deploy-map`: build a fresh deployment record

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::errors::DeployDataError;
use crate::logs::log_failure;
use crate::models::deployment::{DeploymentData, OverallStatus};
use crate::models::package::DeploymentPackage;
use crate::models::rrc::ReleaseReadinessConfig;
use crate::outputs::Outputs;
use crate::progression::release;
use crate::progression::resolver::{self, ResolveContext};
use crate::quality::{self, QualityContext};

/// Build the record: package identity, quality snapshot, CD progression and
/// rollback target.
pub async fn run(options: &AppOptions, outputs: &mut Outputs) -> Result<DeploymentData, DeployDataError> {
    let package = DeploymentPackage::from_value(options.deploy_package.clone())?;
    let mut record = DeploymentData::new(
        &options.deploy_env,
        options.deploy_operation.clone(),
        options.manifest_deploy,
        package,
    );
    info!("Creating deployment record for {} in {}", record.name, record.env);

    let ctx = QualityContext {
        package_name: &record.name,
        env: &record.env,
        operation: &record.operation,
        manifest_deploy: record.manifest_deploy,
        dispatcher_deploy: record.dispatcher_deploy,
    };
    let mut snapshot = quality::build_snapshot(&options.quality, &ctx)?;

    if record.dispatcher_deploy {
        record.post_deploy.overall_status = Some(OverallStatus::Success);
        record.post_deploy.comments = Some(format!(
            "Dispatcher deploy result success for AMS configs version {}",
            record.version
        ));
    }

    let props = options.quality.artifact_props.clone().unwrap_or_default();

    if record.is_cd() {
        let rrc_file = options.layout.rrc_file();
        if !rrc_file.exists().await {
            return Err(DeployDataError::ConfigError(format!(
                "Release-readiness config not found at {}",
                rrc_file.path().display()
            )));
        }
        let rrc: ReleaseReadinessConfig = rrc_file.read_yaml().await?;
        let resolve_ctx = ResolveContext {
            package_name: &record.name,
            env: &record.env,
            manifest_deploy: record.manifest_deploy,
            today: options.today,
        };
        let mut auto_deploy = resolver::resolve(&rrc, &options.cd, &props, &resolve_ctx)?;
        if auto_deploy.env_name == "DEV" {
            snapshot.autorollback_enabled = false;
        }

        match release::reconcile(
            &mut auto_deploy,
            &mut snapshot,
            record.deploy_package.deploy_version(),
            &options.release,
        ) {
            Ok(Some(jira_id)) => outputs.set("jira-id", jira_id),
            Ok(None) => {}
            Err(e) => log_failure(&format!("Error reconciling release record: {}", e)),
        }
        record.auto_deploy = Some(auto_deploy);
    }

    record
        .deploy_package
        .attach_rollback(&options.last_deployed, props.values("SECONDARY_ARTIFACTS"));
    if record.deploy_package.rollback_artifact().is_none() {
        warn!("No previous deployment of {}; rollback unavailable", record.name);
    }

    outputs.set_bool("rollback-enabled", snapshot.autorollback_enabled);
    record.quality = Some(snapshot);
    if let Some(auto_deploy) = &record.auto_deploy {
        outputs.set_json("deploy-data", auto_deploy)?;
    }

    Ok(record)
}
