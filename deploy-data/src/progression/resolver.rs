//! CD progression resolver
//!
//! Diffs the release plan in `ReleaseReadinessConfig.yaml` against the
//! environments an artifact was already deployed to, and works out where the
//! current deployment sits in that plan and which environment comes next.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::DeployDataError;
use crate::models::artifact::ArtifactProps;
use crate::models::auto_deploy::AutoDeploy;
use crate::models::rrc::{ContentPackage, ReleaseReadinessConfig};
use crate::models::quality::NOT_APPLICABLE;
use crate::utils::sha256_hash;

/// Tiers a manifest release may progress through, in order
pub const MANIFEST_TIERS: [&str; 6] = ["HINT", "REGIONAL", "LOAD", "PREPROD", "STAGE", "PROD"];

/// Tiers of a single-repository release
pub const REPO_TIERS: [&str; 2] = ["DEV", "QA"];

/// Ticket transition used when no mapping applies
pub const DEFAULT_TRANSITION_ID: &str = "221";

/// Transition mapping key used once the plan is complete
pub const DONE_TRANSITION: &str = "DONE";

const SCHEDULED_DATE_FORMAT: &str = "%m/%d/%Y";

/// Environment lookups supplied by the pipeline
#[derive(Debug, Clone, Default)]
pub struct CdInputs {
    /// Lowercase tier name to its physical environment(s), for tiers enabled
    /// with a plain `true`. Also decides which tiers automation may deploy.
    pub environment_mapping: BTreeMap<String, String>,

    /// Physical environment name normalisation
    pub check_env_map: BTreeMap<String, String>,

    /// Tier name (or `DONE`) to ticket transition id
    pub jira_mappings: BTreeMap<String, String>,
}

impl CdInputs {
    /// Normalise a physical environment name
    pub fn normalize_env(&self, env: &str) -> String {
        let env = env.trim();
        self.check_env_map
            .get(env)
            .or_else(|| self.check_env_map.get(&env.to_lowercase()))
            .map(|mapped| mapped.trim())
            .unwrap_or(env)
            .to_lowercase()
    }

    fn transition_id(&self, key: &str) -> Option<&str> {
        self.jira_mappings.get(key).map(String::as_str)
    }
}

/// Physical environments remaining in one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPlan {
    pub tier: String,
    pub envs: Vec<String>,
}

impl TierPlan {
    fn new(tier: impl Into<String>, envs: Vec<String>) -> Self {
        Self {
            tier: tier.into(),
            envs,
        }
    }

    fn contains(&self, env: &str) -> bool {
        self.envs.iter().any(|e| e == env)
    }
}

/// Ordered release plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleasePlan {
    tiers: Vec<TierPlan>,
}

impl ReleasePlan {
    pub fn tiers(&self) -> &[TierPlan] {
        &self.tiers
    }

    fn position(&self, tier: &str) -> Option<usize> {
        self.tiers.iter().position(|plan| plan.tier == tier)
    }

    fn get(&self, tier: &str) -> Option<&TierPlan> {
        self.tiers.iter().find(|plan| plan.tier == tier)
    }

    /// Replace a tier in place, or append it
    fn upsert(&mut self, plan: TierPlan) {
        match self.position(&plan.tier) {
            Some(index) => self.tiers[index] = plan,
            None => self.tiers.push(plan),
        }
    }

    /// Tier whose environments include `env`
    pub fn tier_of(&self, env: &str) -> Option<&str> {
        self.tiers
            .iter()
            .find(|plan| plan.contains(env))
            .map(|plan| plan.tier.as_str())
    }

    pub fn contains_env(&self, env: &str) -> bool {
        self.tiers.iter().any(|plan| plan.contains(env))
    }

    /// Same plan with `deployed` environments removed from every tier
    fn without(&self, deployed: &[String]) -> ReleasePlan {
        let tiers = self
            .tiers
            .iter()
            .map(|plan| {
                let envs = plan
                    .envs
                    .iter()
                    .filter(|env| !deployed.iter().any(|d| d.eq_ignore_ascii_case(env)))
                    .cloned()
                    .collect();
                TierPlan::new(plan.tier.clone(), envs)
            })
            .collect();
        ReleasePlan { tiers }
    }

    fn retain_tiers(&mut self, allowed: &[&str]) {
        self.tiers.retain(|plan| allowed.contains(&plan.tier.as_str()));
    }

    /// Consume `env` from `tier`: drop every earlier tier and remove the
    /// environment, deleting the tier once it has nothing left.
    fn consume(&mut self, tier: &str, env: &str) {
        let Some(index) = self.position(tier) else {
            return;
        };
        self.tiers.drain(..index);
        if let Some(plan) = self.tiers.first_mut() {
            plan.envs.retain(|e| e != env);
            if plan.envs.is_empty() {
                self.tiers.remove(0);
            }
        }
    }

    /// First remaining environment and its tier
    pub fn next(&self) -> Option<(&str, &str)> {
        self.tiers
            .iter()
            .find_map(|plan| plan.envs.first().map(|env| (env.as_str(), plan.tier.as_str())))
    }
}

/// Where the current deployment sits in the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progression {
    pub env_name: String,
    pub env_id: String,
    pub next_env: String,
    pub next_env_name: String,
    pub skip_deploy: bool,
    pub last_lower_env: bool,
    /// Not-yet-deployed plan after consuming the current environment
    pub remaining: ReleasePlan,
}

/// Deployment being resolved
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    pub package_name: &'a str,
    pub env: &'a str,
    pub manifest_deploy: bool,
    /// Current date in the release calendar's timezone
    pub today: NaiveDate,
}

/// Resolve the tier plan declared in the release-readiness config.
///
/// Tiers enabled with `true` take their environments from the environment
/// mapping; CSV tiers are split and normalised. Tiers automation has no
/// mapping for are dropped, and enabling PREPROD implies STAGE and PROD.
pub fn build_plan(rrc: &ReleaseReadinessConfig, inputs: &CdInputs) -> ReleasePlan {
    let mut plan = ReleasePlan::default();

    for (tier, value) in &rrc.jira_details.environments {
        let envs = match value {
            Value::Bool(true) => inputs
                .environment_mapping
                .get(&tier.to_lowercase())
                .map(|mapped| split_envs(mapped, inputs))
                .unwrap_or_default(),
            Value::String(csv) if !csv.is_empty() => split_envs(csv, inputs),
            _ => continue,
        };
        plan.upsert(TierPlan::new(tier.to_uppercase(), envs));
    }
    debug!("Release plan before automation filter: {:?}", plan);

    plan.tiers.retain(|tier| {
        let key = tier.tier.to_lowercase();
        inputs.environment_mapping.contains_key(&key) || key == "dev" || key == "qa"
    });

    if rrc.is_tier_enabled("PREPROD") {
        for tier in ["STAGE", "PROD"] {
            let envs = inputs
                .environment_mapping
                .get(&tier.to_lowercase())
                .map(|mapped| vec![inputs.normalize_env(mapped)])
                .unwrap_or_default();
            plan.upsert(TierPlan::new(tier, envs));
        }
        info!("PREPROD enabled; STAGE and PROD added to the release plan");
    }

    info!("Release plan: {:?}", plan.tiers);
    plan
}

fn split_envs(csv: &str, inputs: &CdInputs) -> Vec<String> {
    csv.split(',')
        .map(|env| inputs.normalize_env(env))
        .filter(|env| !env.is_empty())
        .collect()
}

/// Work out the current tier, the next environment and the transition id
pub fn resolve_progression(
    plan: &ReleasePlan,
    cd_deployed: &[String],
    env: &str,
    manifest_deploy: bool,
    inputs: &CdInputs,
) -> Result<Progression, DeployDataError> {
    let tier_names: &[&str] = if manifest_deploy { &MANIFEST_TIERS } else { &REPO_TIERS };
    let env = inputs.normalize_env(env);
    let env = env.as_str();
    let cd_deployed: Vec<String> = cd_deployed.iter().map(|e| inputs.normalize_env(e)).collect();
    let cd_deployed = cd_deployed.as_slice();

    let mut remaining = plan.without(cd_deployed);
    if manifest_deploy {
        remaining.retain_tiers(&MANIFEST_TIERS);
    }

    let skip_deploy = !remaining
        .tiers
        .iter()
        .flat_map(|tier| tier.envs.iter())
        .any(|e| e.eq_ignore_ascii_case(env));
    let env_name = plan.tier_of(env).unwrap_or_default().to_string();

    let mut last_lower_env = false;
    if remaining.get(&env_name).is_some_and(|tier| tier.contains(env)) {
        let last_tier = remaining
            .tiers
            .iter()
            .rev()
            .find(|tier| tier_names.contains(&tier.tier.as_str()) && !tier.envs.is_empty())
            .ok_or_else(|| {
                DeployDataError::ConfigError(format!(
                    "No deployable tiers in the release plan for {}",
                    env
                ))
            })?;
        last_lower_env = last_tier.envs.last().is_some_and(|last| last == env);
        remaining.consume(&env_name, env);
    } else if !manifest_deploy {
        last_lower_env = true;
    }
    info!("Deploy environment: {}; not yet deployed: {:?}", env, remaining.tiers);

    let current_tier = if skip_deploy { "" } else { env_name.as_str() };
    let (next_env, next_env_name) = remaining
        .next()
        .map(|(env, tier)| (env.to_string(), tier.to_string()))
        .unwrap_or_default();

    let default_id = match remaining.position(&next_env_name) {
        Some(index) if index > 0 && next_env_name != "DEV" => inputs
            .transition_id(&remaining.tiers[index - 1].tier)
            .unwrap_or(DEFAULT_TRANSITION_ID),
        _ => DEFAULT_TRANSITION_ID,
    };
    let env_id = if next_env.is_empty() {
        inputs.transition_id(DONE_TRANSITION)
    } else {
        inputs.transition_id(current_tier)
    }
    .unwrap_or(default_id)
    .to_string();

    Ok(Progression {
        env_name,
        env_id,
        next_env,
        next_env_name,
        skip_deploy,
        last_lower_env,
        remaining,
    })
}

/// Content package identity derived from the declared content details
pub fn content_package(content: &ContentPackage, package_name: &str) -> ContentPackage {
    let mut content = content.clone();
    if content.content_change {
        let hash = sha256_hash(content.content_details.concat().as_bytes());
        content.content_id = Some(format!("{}.content", package_name));
        content.content_version = Some(hash[..10].to_string());
    }
    content
}

/// Scheduled dates must parse as `MM/DD/YYYY` and not be in the past
pub fn validate_scheduled_date(date: Option<&str>, today: NaiveDate) -> Result<(), DeployDataError> {
    let Some(date) = date else {
        info!("No ScheduledDate provided in the release-readiness config");
        return Ok(());
    };
    let scheduled = NaiveDate::parse_from_str(date, SCHEDULED_DATE_FORMAT).map_err(|e| {
        DeployDataError::ValidationError(format!(
            "Invalid ScheduledDate {}: {}. Date should be in the future and use MM/DD/YYYY",
            date, e
        ))
    })?;
    if scheduled < today {
        return Err(DeployDataError::ValidationError(format!(
            "ScheduledDate {} is before the current date {}",
            date,
            today.format(SCHEDULED_DATE_FORMAT)
        )));
    }
    Ok(())
}

/// Physical environments of the listed tiers, in plan order
fn tier_envs(plan: &ReleasePlan, tiers: &[String]) -> Vec<String> {
    plan.tiers
        .iter()
        .filter(|plan| tiers.iter().any(|t| t.eq_ignore_ascii_case(&plan.tier)))
        .flat_map(|plan| plan.envs.iter().cloned())
        .collect()
}

/// Build the CD progression section of a new deployment record
pub fn resolve(
    rrc: &ReleaseReadinessConfig,
    inputs: &CdInputs,
    props: &ArtifactProps,
    ctx: &ResolveContext<'_>,
) -> Result<AutoDeploy, DeployDataError> {
    let fix_version = rrc.jira_details.fix_version.clone().ok_or_else(|| {
        DeployDataError::ConfigError(
            "fixVersion is missing in ReleaseReadinessConfig.yaml; add a valid fixVersion before proceeding"
                .to_string(),
        )
    })?;

    let plan = build_plan(rrc, inputs);
    let cd_deployed = props.values("CONTINUOUS_DEPLOY").to_vec();
    let progression = resolve_progression(&plan, &cd_deployed, ctx.env, ctx.manifest_deploy, inputs)?;

    let regression_tiers = &rrc.jira_details.regression;
    let dod_tiers: Vec<String> = rrc
        .jira_details
        .dod
        .iter()
        .filter(|tier| regression_tiers.iter().any(|r| r.eq_ignore_ascii_case(tier)))
        .cloned()
        .collect();

    let mut snow_details = rrc.snow_details.clone();
    if let Some(analysis) = rrc.open_enrollment_risk_analysis.as_ref().filter(|v| !v.is_null()) {
        snow_details.insert("openEnrollmentRiskAnalysis".to_string(), analysis.clone());
    }
    validate_scheduled_date(rrc.scheduled_date(), ctx.today)?;

    Ok(AutoDeploy {
        env_name: progression.env_name,
        env_id: progression.env_id,
        next_env: progression.next_env,
        next_env_name: progression.next_env_name,
        cd_deployed,
        skip_deploy: progression.skip_deploy,
        last_lower_env: progression.last_lower_env,
        teams_channel: props.first_or("TEAMS_CHANNEL", ""),
        load_self_waived: rrc.load_intake_details.load_self_waived,
        branch: props.first_or("GIT_BRANCH", "master"),
        region: snow_details
            .get("impacted_region")
            .and_then(Value::as_str)
            .unwrap_or(NOT_APPLICABLE)
            .to_string(),
        qtest_folder: rrc.qtest_folder.clone().unwrap_or_default(),
        regression: tier_envs(&plan, regression_tiers),
        dod_envs: tier_envs(&plan, &dod_tiers),
        arb_risk: rrc.arb_risk,
        arb_risk_comment: rrc.arb_risk_comment.clone().unwrap_or_default(),
        fix_version,
        backout_artifact: rrc.backout_artifact_version.clone(),
        release_type: rrc
            .release_type
            .clone()
            .unwrap_or_else(|| "general".to_string()),
        content: rrc
            .content
            .as_ref()
            .map(|content| content_package(content, ctx.package_name)),
        snow_details,
        ..Default::default()
    })
}
