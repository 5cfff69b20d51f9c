//! Process environment snapshot
//!
//! Pipeline steps pass their inputs as environment variables, many of them
//! YAML or JSON documents. The snapshot is taken once at start-up and every
//! value is parsed from it, so components never read the environment directly.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::DeployDataError;
use crate::models::de;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// Snapshot the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Value of a variable; empty values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn present(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// `true` only for the literal string `true`
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Parse a YAML (or JSON) document; unset and `null` give the default
    pub fn yaml<T>(&self, key: &str) -> Result<T, DeployDataError>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.get(key) else {
            return Ok(T::default());
        };
        let value: Option<T> = serde_yaml::from_str(raw)
            .map_err(|e| DeployDataError::ConfigError(format!("Invalid {}: {}", key, e)))?;
        Ok(value.unwrap_or_default())
    }

    /// Parse a YAML mapping whose scalar values are read as strings
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>, DeployDataError> {
        let map: BTreeMap<String, Value> = self.yaml(key)?;
        Ok(map
            .into_iter()
            .filter_map(|(k, v)| de::scalar_string(&v).map(|v| (k, v)))
            .collect())
    }
}
