//! Deployed version comparison

use semver::Version;
use tracing::{info, warn};

/// Strip build qualifiers: `app-1.2.0-SNAPSHOT` -> `1.2.0`
fn release_number(version: &str) -> String {
    version
        .to_lowercase()
        .replace("-snapshot", "")
        .replace("-release", "")
        .rsplit('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parse `1`, `1.2` or `1.2.3` (missing components are zero)
fn parse_lenient(version: &str) -> Result<Version, semver::Error> {
    let parts = version.split('.').count();
    let padded = match parts {
        1 => format!("{}.0.0", version),
        2 => format!("{}.0", version),
        _ => version.to_string(),
    };
    Version::parse(&padded)
}

/// The version already on the servers is the same as or newer than the one
/// being deployed. Unparseable versions never count as deployed.
pub fn check_existing_version(current_version: &str, package_version: &str) -> bool {
    let existing = release_number(current_version);
    let incoming = release_number(package_version);
    info!("Existing version: {}; package version: {}", existing, incoming);

    match (parse_lenient(&existing), parse_lenient(&incoming)) {
        (Ok(existing), Ok(incoming)) => existing >= incoming,
        (Err(e), _) | (_, Err(e)) => {
            warn!("Unable to compare versions {} and {}: {}", current_version, package_version, e);
            false
        }
    }
}
