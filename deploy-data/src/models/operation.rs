//! Pipeline operation that triggered the deployment (e.g. `promote-to-stage`)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deploy operation as reported by the workflow dispatch.
///
/// Operations are matched by prefix, so `promote-to-stage-hotfix` counts as a
/// stage promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployOperation(String);

/// Operations for which a rollback is never performed
const ROLLBACK_EXEMPT: [&str; 4] = [
    "run-tests",
    "deploy-to-dev",
    "ams-code-quality",
    "promote-to-stage",
];

impl DeployOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self(operation.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_run_tests(&self) -> bool {
        self.0.starts_with("run-tests")
    }

    pub fn is_promote_to_stage(&self) -> bool {
        self.0.starts_with("promote-to-stage")
    }

    pub fn is_promote_to_preprod(&self) -> bool {
        self.0.starts_with("promote-to-preprod")
    }

    /// Promotions to stage or preprod skip the post-deploy critical re-test
    pub fn is_higher_env_promotion(&self) -> bool {
        self.is_promote_to_stage() || self.is_promote_to_preprod()
    }

    pub fn is_rollback(&self) -> bool {
        self.0 == "rollback"
    }

    pub fn is_uninstall(&self) -> bool {
        self.0 == "uninstall"
    }

    pub fn is_rollback_exempt(&self) -> bool {
        ROLLBACK_EXEMPT.iter().any(|op| self.0.starts_with(op))
    }
}

impl Default for DeployOperation {
    fn default() -> Self {
        Self("N/A".to_string())
    }
}

impl fmt::Display for DeployOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeployOperation {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
