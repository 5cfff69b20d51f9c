//! `deploy`: install the package on every server and record the result

use serde_json::Value;
use tracing::info;

use crate::deploy::executor::{self, DeployFlow, DeployInputs};
use crate::deploy::package_manager::PackageManager;
use crate::errors::DeployDataError;
use crate::models::deployment::{DeployStatus, DeploymentData};
use crate::models::operation::DeployOperation;
use crate::models::package::{DeploymentPackage, OnDemandRequest};
use crate::outputs::Outputs;

/// Record for an on-demand deployment started without a persisted map
pub fn on_demand_record(
    env: &str,
    operation: DeployOperation,
    manifest_deploy: bool,
    deploy_package: &Value,
) -> Result<DeploymentData, DeployDataError> {
    let request: OnDemandRequest = serde_json::from_value(deploy_package.clone())?;
    info!("No deployment record found; on-demand deploy of {}", request.name);
    Ok(DeploymentData::new(
        env,
        operation,
        manifest_deploy,
        DeploymentPackage::on_demand(request),
    ))
}

/// Deploy the record's package.
///
/// `operation` is the deploy step's own operation; a `rollback` run redeploys
/// the previous version of a record that already went through post-deploy, and
/// keeps its rollback flag.
pub async fn run<M: PackageManager + ?Sized>(
    manager: &M,
    record: &mut DeploymentData,
    operation: &DeployOperation,
    inputs: &DeployInputs,
    outputs: &mut Outputs,
) -> Result<(), DeployDataError> {
    let flow = DeployFlow::new(&record.deploy_package, operation);
    info!(
        "Deploying {} to {} (rollback: {}, uninstall: {})",
        record.name, record.env, flow.rollback, flow.uninstall
    );

    record.deploy.deploy_status = Some(DeployStatus::Success);
    record.deploy.version_deployed = None;
    if !flow.rollback {
        record.deploy.rollback = false;
    }

    executor::deploy_package(manager, &mut record.deploy_package, &mut record.deploy, inputs, flow).await;

    // On-demand records carry no quality section and no bundle to confirm
    let core_name = record.quality.as_ref().and_then(|q| q.core_name.clone());
    if !flow.rollback && !record.deploy.failed() && !record.deploy.skipped() {
        executor::confirm_install(
            manager,
            core_name.as_deref(),
            &record.deploy_package,
            &mut record.deploy,
            inputs,
        )
        .await?;
    }

    info!("Deploy status for {}: {:?}", record.name, record.deploy.deploy_status);
    outputs.set_bool("rollback-scenario", record.deploy.rollback);
    Ok(())
}
