//! `check-deploy-map`: pick the post-deploy tests to run

use tracing::{info, warn};

use crate::decision::{self, TestGateInputs, TestPlan};
use crate::errors::DeployDataError;
use crate::models::deployment::DeploymentData;
use crate::outputs::Outputs;

pub fn run(record: &DeploymentData, gate: &TestGateInputs, outputs: &mut Outputs) -> Result<TestPlan, DeployDataError> {
    record.quality()?;
    let plan = decision::plan_post_deploy_tests(record, gate);

    if plan.smoke {
        let vault = gate.vault_map.get(&record.env);
        if vault.is_none() {
            warn!("No vault map configured for {}", record.env);
        }
        outputs.set_json("vault-map", &vault)?;
    }

    info!(
        "Run post-deploy tests on {}: smoke={} regression={} dod={}",
        record.name, plan.smoke, plan.regression, plan.dod
    );
    outputs.set_json("run-tests", &plan)?;
    Ok(plan)
}
