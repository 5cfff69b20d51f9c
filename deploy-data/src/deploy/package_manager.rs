//! AEM package manager client
//!
//! Uploads, installs and deletes content packages through the package
//! manager HTTP service. Every call is retried a fixed number of times with a
//! fixed pause between attempts; there is no backoff.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::errors::DeployDataError;

const PACKMGR_SERVICE: &str = "/crx/packmgr/service/.json";
const BUNDLES_PATH: &str = "/system/console/bundles.json";

/// Basic-auth credentials for one set of servers (`user:password`)
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn parse(raw: &str) -> Self {
        let (username, password) = raw.split_once(':').unwrap_or((raw, ""));
        Self {
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Credentials::parse(&raw))
    }
}

/// Author and publisher servers sharing one set of credentials
#[derive(Debug, Deserialize)]
pub struct VaultEntry {
    pub aem_creds: Credentials,

    #[serde(default)]
    pub server: Vec<String>,
}

/// Fixed-interval retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Package operations
    pub const PACKAGE: RetryPolicy = RetryPolicy {
        attempts: 7,
        interval: Duration::from_secs(5),
    };

    /// Bundle status confirmation
    pub const CONFIRM: RetryPolicy = RetryPolicy {
        attempts: 3,
        interval: Duration::from_secs(5),
    };
}

/// Package manager operations used by the deploy loop
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Upload a package and return its path on the server
    async fn upload(&self, server: &str, creds: &Credentials, package: &Path) -> Result<String, DeployDataError>;

    async fn install(&self, server: &str, creds: &Credentials, package_path: &str) -> Result<(), DeployDataError>;

    async fn delete(&self, server: &str, creds: &Credentials, package_path: &str) -> Result<(), DeployDataError>;

    /// OSGi bundle listing (`data: [{name, state}]`)
    async fn bundles(&self, server: &str, creds: &Credentials) -> Result<Value, DeployDataError>;
}

/// HTTP implementation of [`PackageManager`]
pub struct AemPackageClient {
    client: Client,
    workspace: PathBuf,
    package_retry: RetryPolicy,
    confirm_retry: RetryPolicy,
}

impl AemPackageClient {
    pub fn new(workspace: impl Into<PathBuf>, insecure_tls: bool) -> Result<Self, DeployDataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(360))
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;

        Ok(Self {
            client,
            workspace: workspace.into(),
            package_retry: RetryPolicy::PACKAGE,
            confirm_retry: RetryPolicy::CONFIRM,
        })
    }

    pub fn with_retry(mut self, package_retry: RetryPolicy, confirm_retry: RetryPolicy) -> Self {
        self.package_retry = package_retry;
        self.confirm_retry = confirm_retry;
        self
    }

    fn service_url(server: &str, package_path: &str, cmd: &str) -> String {
        format!(
            "{}{}{}?cmd={}",
            server.trim_end_matches('/'),
            PACKMGR_SERVICE,
            package_path.replace(' ', "%20"),
            cmd
        )
    }

    /// Send a request until the service reports `success: true`.
    ///
    /// With `skip_check` any JSON body is accepted.
    async fn send_with_retry<F>(
        &self,
        policy: RetryPolicy,
        skip_check: bool,
        build: F,
    ) -> Result<Value, DeployDataError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=policy.attempts {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    match serde_json::from_str::<Value>(&body) {
                        Ok(value) if skip_check || value.get("success") == Some(&Value::Bool(true)) => {
                            return Ok(value);
                        }
                        _ => last_error = format!("{}: {}", status, body),
                    }
                }
                Err(e) if e.is_timeout() => last_error = "Timed out waiting for server.".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            error!("Attempt {}: {}", attempt, last_error);
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        Err(DeployDataError::DeployError(last_error))
    }

    fn authed(&self, builder: RequestBuilder, creds: &Credentials) -> RequestBuilder {
        builder.basic_auth(&creds.username, Some(creds.password.expose_secret()))
    }
}

#[async_trait]
impl PackageManager for AemPackageClient {
    async fn upload(&self, server: &str, creds: &Credentials, package: &Path) -> Result<String, DeployDataError> {
        info!("Uploading package to {} from {}", server, package.display());
        let local_path = self.workspace.join(package);
        let bytes = tokio::fs::read(&local_path).await?;
        let file_name = package
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.zip".to_string());
        let url = Self::service_url(server, "/", "upload");

        let uploaded = self
            .send_with_retry(self.package_retry, false, || {
                let form = Form::new()
                    .text("force", "true")
                    .part("package", Part::bytes(bytes.clone()).file_name(file_name.clone()));
                self.authed(self.client.post(&url), creds).multipart(form)
            })
            .await
            .map_err(|e| DeployDataError::DeployError(format!("Error uploading package to {}: {}", server, e)))?;

        let upload_path = uploaded
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployDataError::DeployError(format!("Upload response from {} has no path", server)))?;
        info!("Package uploaded successfully: {}", upload_path);
        Ok(upload_path.to_string())
    }

    async fn install(&self, server: &str, creds: &Credentials, package_path: &str) -> Result<(), DeployDataError> {
        info!("Installing package on {} at path {}", server, package_path);
        let url = Self::service_url(server, package_path, "install");
        let installed = self
            .send_with_retry(self.package_retry, false, || self.authed(self.client.post(&url), creds))
            .await
            .map_err(|e| DeployDataError::DeployError(format!("AEM install package failed: {}", e)))?;
        debug!("Install response: {}", installed);
        Ok(())
    }

    async fn delete(&self, server: &str, creds: &Credentials, package_path: &str) -> Result<(), DeployDataError> {
        info!("Deleting package at {} on {}", package_path, server);
        let url = Self::service_url(server, package_path, "delete");
        self.send_with_retry(self.package_retry, false, || self.authed(self.client.post(&url), creds))
            .await?;
        Ok(())
    }

    async fn bundles(&self, server: &str, creds: &Credentials) -> Result<Value, DeployDataError> {
        let url = format!("{}{}", server.trim_end_matches('/'), BUNDLES_PATH);
        self.send_with_retry(self.confirm_retry, true, || {
            self.authed(self.client.get(&url), creds)
                .header("X-Requested-With", "XMLHttpRequest")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_parse() {
        let creds = Credentials::parse("admin:s3cr:et");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose_secret(), "s3cr:et");
        assert!(!format!("{:?}", creds).contains("s3cr"));
    }

    #[test]
    fn test_vault_entry_from_yaml() {
        let entry: VaultEntry =
            serde_yaml::from_str("aem_creds: 'user:pw'\nserver: [https://author, https://publish]").unwrap();
        assert_eq!(entry.server.len(), 2);
        assert_eq!(entry.aem_creds.username, "user");
    }

    #[test]
    fn test_service_url_escapes_spaces() {
        assert_eq!(
            AemPackageClient::service_url("https://author/", "/etc/packages/my app.zip", "install"),
            "https://author/crx/packmgr/service/.json/etc/packages/my%20app.zip?cmd=install"
        );
    }
}
