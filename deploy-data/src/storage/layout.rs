//! Workspace layout

use std::path::PathBuf;

use crate::filesys::file::File;

/// Name of the state file threaded between pipeline stages
pub const DEPLOY_MAP_FILE: &str = "package_deploy_map.json";

/// Name of the release-readiness config file
pub const RRC_FILE: &str = "ReleaseReadinessConfig.yaml";

/// Layout of the pipeline workspace
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Workspace root (`GITHUB_WORKSPACE`)
    pub base_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Create a new workspace layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The state file at the workspace root
    pub fn deploy_map_file(&self) -> File {
        File::new(self.base_dir.join(DEPLOY_MAP_FILE))
    }

    /// The state file downloaded from an earlier job's results artifact
    pub fn results_deploy_map_file(&self, package_name: &str, deploy_env: &str) -> File {
        File::new(
            self.base_dir
                .join(format!("deploy-results-{}-{}", package_name, deploy_env))
                .join(DEPLOY_MAP_FILE),
        )
    }

    /// The release-readiness config
    pub fn rrc_file(&self) -> File {
        File::new(self.base_dir.join(RRC_FILE))
    }
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
