//! Package deploy loop
//!
//! Deploys every artifact of a package to every server of every vault entry,
//! one at a time, and records the outcome in the `deploy` section.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::deploy::package_manager::{Credentials, PackageManager, VaultEntry};
use crate::deploy::version::check_existing_version;
use crate::errors::DeployDataError;
use crate::logs::log_failure;
use crate::models::deployment::{DeployResult, DeployStatus};
use crate::models::package::{DeploymentPackage, PackageAction};
use crate::models::operation::DeployOperation;

/// Inputs of the deploy stage
#[derive(Debug, Default)]
pub struct DeployInputs {
    /// Vault entry name to servers and credentials
    pub vault_map: BTreeMap<String, VaultEntry>,

    /// Artifact id to the package file, relative to the workspace
    pub artifact_paths: BTreeMap<String, String>,

    /// Accept self-signed server certificates
    pub insecure_tls: bool,

    /// Bundle state checks before giving up on an inactive install
    pub confirm_checks: u32,

    /// Pause between bundle state checks
    pub confirm_interval: Duration,
}

impl DeployInputs {
    pub fn with_defaults() -> Self {
        Self {
            confirm_checks: 10,
            confirm_interval: Duration::from_secs(15),
            ..Default::default()
        }
    }
}

/// Which deploy flow is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployFlow {
    /// Redeploying a previous version
    pub rollback: bool,
    /// Removing the package from the servers
    pub uninstall: bool,
}

impl DeployFlow {
    pub fn new(package: &DeploymentPackage, operation: &DeployOperation) -> Self {
        Self {
            rollback: package.action == PackageAction::Rollback || operation.is_rollback(),
            uninstall: package.action == PackageAction::Uninstall || operation.is_uninstall(),
        }
    }
}

async fn delete_logged<M: PackageManager + ?Sized>(
    manager: &M,
    server: &str,
    creds: &Credentials,
    package_path: &str,
) {
    if let Err(e) = manager.delete(server, creds, package_path).await {
        error!("AEM delete command failed on {}: {}", server, e);
    }
}

/// Deploy one artifact to one server
async fn deploy_artifact<M: PackageManager + ?Sized>(
    manager: &M,
    artifact: &str,
    package: &mut DeploymentPackage,
    result: &mut DeployResult,
    server: &str,
    creds: &Credentials,
    artifact_paths: &BTreeMap<String, String>,
    flow: DeployFlow,
) -> Result<(), DeployDataError> {
    let rollback_version = package.module_values_rollback.artifact_version.clone();
    let has_previous = flow.rollback || rollback_version.is_some();
    let existing_path = package.path.get(artifact).cloned().filter(|p| !p.is_empty());
    let content_package = artifact.contains(".content");

    let mut skip = false;
    if flow.uninstall {
        skip = true;
        match &existing_path {
            Some(path) => delete_logged(manager, server, creds, path).await,
            None => info!("No existing package found on {}", server),
        }
    }

    if !(flow.rollback || flow.uninstall) && package.is_primary(artifact) {
        if let (Some(_), Some(current)) = (&existing_path, &rollback_version) {
            let incoming = package.deploy_version().unwrap_or_default();
            let deployed = check_existing_version(current, incoming);
            result.version_deployed = Some(deployed);
            if deployed && !package.force_deploy {
                info!(
                    "Found same or higher version already deployed on {}. Previous version: {}",
                    server, current
                );
                skip = true;
            }
        }
    }

    if skip {
        result.deploy_status = Some(DeployStatus::Skipped);
        return Ok(());
    }

    if content_package && flow.rollback {
        info!("Deleting content package on rollback: {}", artifact);
        if let Some(path) = &existing_path {
            delete_logged(manager, server, creds, path).await;
        }
        return Ok(());
    }

    let local_path = artifact_paths.get(artifact).ok_or_else(|| {
        DeployDataError::DeployError(format!("No package file for artifact {}", artifact))
    })?;
    let upload_path = manager.upload(server, creds, Path::new(local_path)).await?;
    package.path.insert(artifact.to_string(), upload_path.clone());

    if let Some(previous) = existing_path.filter(|previous| has_previous && *previous != upload_path) {
        info!("Deleting the previous package: {}", previous);
        delete_logged(manager, server, creds, &previous).await;
    }

    manager.install(server, creds, &upload_path).await
}

/// Run the install loop. A failed artifact stops the loop and marks the
/// deployment failed; a rollback then becomes possible when a rollback
/// target exists.
pub async fn deploy_package<M: PackageManager + ?Sized>(
    manager: &M,
    package: &mut DeploymentPackage,
    result: &mut DeployResult,
    inputs: &DeployInputs,
    flow: DeployFlow,
) {
    let artifacts = package.deploy_artifacts.clone();

    for entry in inputs.vault_map.values() {
        for server in &entry.server {
            for artifact in &artifacts {
                info!("Deploying {} to server {}", artifact, server);
                if let Err(e) = deploy_artifact(
                    manager,
                    artifact,
                    package,
                    result,
                    server,
                    &entry.aem_creds,
                    &inputs.artifact_paths,
                    flow,
                )
                .await
                {
                    log_failure(&format!("Error in deploy of {} on {}: {}", artifact, server, e));
                    result.deploy_status = Some(DeployStatus::Failed);
                    result.rollback = package.rollback_artifact().is_some();
                    return;
                }
            }
        }
    }
}

/// Bundle `core_name` is not active on `server` after every check
pub async fn bundle_inactive<M: PackageManager + ?Sized>(
    manager: &M,
    server: &str,
    creds: &Credentials,
    core_name: &str,
    inputs: &DeployInputs,
) -> Result<bool, DeployDataError> {
    for check in 1..=inputs.confirm_checks {
        let bundles = manager.bundles(server, creds).await?;
        let state = bundles
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|bundle| {
                bundle
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.eq_ignore_ascii_case(core_name))
            })
            .map(|bundle| bundle.get("state").and_then(Value::as_str).unwrap_or_default().to_string());

        let Some(state) = state else {
            info!("Bundle {} not found on {}", core_name, server);
            return Ok(false);
        };
        info!("Found bundle {} on {}: {}", core_name, server, state);
        if state == "Active" {
            return Ok(false);
        }
        if check < inputs.confirm_checks {
            tokio::time::sleep(inputs.confirm_interval).await;
        }
    }
    Ok(true)
}

/// Fail the deployment when the installed bundle never becomes active
pub async fn confirm_install<M: PackageManager + ?Sized>(
    manager: &M,
    core_name: Option<&str>,
    package: &DeploymentPackage,
    result: &mut DeployResult,
    inputs: &DeployInputs,
) -> Result<(), DeployDataError> {
    let Some(core_name) = core_name else {
        return Ok(());
    };
    for entry in inputs.vault_map.values() {
        for server in &entry.server {
            if bundle_inactive(manager, server, &entry.aem_creds, core_name, inputs).await? {
                warn!("Install failed: {} not active on {}", core_name, server);
                result.deploy_status = Some(DeployStatus::Failed);
                result.rollback = package.rollback_artifact().is_some();
                return Ok(());
            }
        }
    }
    Ok(())
}
