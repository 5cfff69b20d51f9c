//! Stage dispatch
//!
//! One invocation runs one stage: load the record, advance its lifecycle,
//! apply the stage, then persist the record and flush the step outputs.

use tracing::{debug, info};

use crate::app::options::AppOptions;
use crate::deploy::fsm::{RecordLifecycle, RecordStage, StageEvent};
use crate::deploy::package_manager::AemPackageClient;
use crate::errors::{DeployDataError, ErrorKind};
use crate::logs::log_failure;
use crate::models::deployment::DeploymentData;
use crate::outputs::Outputs;
use crate::stages::{
    check_deploy_map, create, deploy, deploy_data, notifications, post_deploy, post_deploy_test, StageOperation,
};

/// What a finished stage produced
#[derive(Debug, Clone)]
pub struct StageReport {
    pub operation: StageOperation,
    pub record: DeploymentData,
    pub outputs: Outputs,
}

impl StageReport {
    pub fn stage(&self) -> RecordStage {
        self.record.stage
    }
}

/// Run the configured stage.
///
/// Nothing is persisted and no outputs are written when the stage fails.
pub async fn run(options: &AppOptions) -> Result<StageReport, DeployDataError> {
    info!("Running {}", options.operation);
    let mut outputs = Outputs::new();

    let record = match dispatch(options, &mut outputs).await {
        Ok(record) => record,
        Err(e) => {
            match e.kind() {
                ErrorKind::Fatal => log_failure(&format!("{} failed: {}", options.operation, e)),
                ErrorKind::Transient | ErrorKind::Degraded => log_failure(&format!(
                    "{} failed, deployment data not updated: {}",
                    options.operation, e
                )),
            }
            return Err(e);
        }
    };

    options.layout.deploy_map_file().write_json(&record).await?;
    outputs.set_json("deployment-data", &record)?;
    outputs.set("package-name", record.name.clone());
    debug!("Deployment data: {}", serde_json::to_string_pretty(&record)?);
    outputs.flush(options.output_file.as_ref()).await?;

    info!("{} complete for {} ({:?})", options.operation, record.name, record.stage);
    Ok(StageReport {
        operation: options.operation,
        record,
        outputs,
    })
}

/// Read the persisted record, falling back to the copy downloaded from the
/// results of an earlier job
pub async fn load_record(options: &AppOptions) -> Result<Option<DeploymentData>, DeployDataError> {
    let root = options.layout.deploy_map_file();
    if root.exists().await {
        debug!("Reading deployment data from {}", root.path().display());
        return Ok(Some(root.read_json().await?));
    }

    let Some(name) = options.deploy_package.get("name").and_then(|name| name.as_str()) else {
        return Ok(None);
    };
    let results = options.layout.results_deploy_map_file(name, &options.deploy_env);
    if results.exists().await {
        debug!("Reading deployment data from {}", results.path().display());
        return Ok(Some(results.read_json().await?));
    }
    Ok(None)
}

/// Move the record to the stage's lifecycle state
fn advance(record: &mut DeploymentData, operation: StageOperation) -> Result<(), DeployDataError> {
    advance_with(record, operation, operation.event())
}

fn advance_with(record: &mut DeploymentData, operation: StageOperation, event: StageEvent) -> Result<(), DeployDataError> {
    let mut lifecycle = RecordLifecycle::new(record.stage);
    lifecycle
        .process(event)
        .map_err(|e| DeployDataError::StateError(format!("{} for {}: {}", operation, record.name, e)))?;
    record.stage = lifecycle.state();
    Ok(())
}

async fn dispatch(options: &AppOptions, outputs: &mut Outputs) -> Result<DeploymentData, DeployDataError> {
    let operation = options.operation;

    if operation == StageOperation::CreateDeployMap {
        let mut record = create::run(options, outputs).await?;
        advance(&mut record, operation)?;
        return Ok(record);
    }

    let loaded = load_record(options).await?;

    if operation == StageOperation::Deploy {
        let mut record = match loaded {
            Some(record) => record,
            None => deploy::on_demand_record(
                &options.deploy_env,
                options.deploy_operation.clone(),
                options.manifest_deploy,
                &options.deploy_package,
            )?,
        };
        let event = if options.deploy_operation.is_rollback() {
            StageEvent::RollbackDeploy
        } else {
            operation.event()
        };
        advance_with(&mut record, operation, event)?;
        let manager = AemPackageClient::new(&options.layout.base_dir, options.deploy.insecure_tls)?;
        deploy::run(&manager, &mut record, &options.deploy_operation, &options.deploy, outputs).await?;
        return Ok(record);
    }

    let mut record = loaded
        .ok_or_else(|| DeployDataError::StateError(format!("No deployment data found for {}", operation)))?;
    advance(&mut record, operation)?;

    match operation {
        StageOperation::PostDeploy => post_deploy::run(&mut record, &options.critical, outputs)?,
        StageOperation::CheckDeployMap => {
            check_deploy_map::run(&record, &options.test_gate, outputs)?;
        }
        StageOperation::PostDeployTest => post_deploy_test::run(&mut record, &options.test_results, outputs)?,
        StageOperation::DeployData => deploy_data::run(&mut record, &options.cd, outputs)?,
        StageOperation::AemNotifications => notifications::run(&mut record, &options.notify, outputs)?,
        StageOperation::CreateDeployMap | StageOperation::Deploy => {
            return Err(DeployDataError::Internal(format!("{} dispatched twice", operation)));
        }
    }
    Ok(record)
}
