//! GitHub Actions step outputs

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::DeployDataError;
use crate::filesys::file::File;

/// Render a flag the way downstream workflow expressions compare it
pub fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Step outputs, in the order they were set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    entries: Vec<(String, String)>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output, replacing any earlier value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, flag(value));
    }

    /// Set an output to compact JSON
    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), DeployDataError> {
        let json = serde_json::to_string(value)?;
        self.set(key, json);
        Ok(())
    }

    /// Set an output when a value exists
    pub fn set_opt(&mut self, key: &str, value: Option<impl Into<String>>) {
        match value {
            Some(value) => self.set(key, value),
            None => warn!("No value for output {}, skipping", key),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every output to the step output file
    pub async fn flush(&self, file: Option<&File>) -> Result<(), DeployDataError> {
        let Some(file) = file else {
            warn!("GITHUB_OUTPUT is not set; {} outputs not written", self.entries.len());
            return Ok(());
        };
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        debug!("Writing {} outputs to {}", lines.len(), file.path().display());
        file.append_lines(&lines).await
    }
}
