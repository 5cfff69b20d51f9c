//! Artifact repository properties attached to the build being deployed

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Property values are lists in the repository; single values are accepted too
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    One(String),
    Many(Vec<String>),
}

/// Artifact properties, keyed by property name (`SONAR_QUALITY_GATE`, `SMOKE`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArtifactProps(BTreeMap<String, Vec<String>>);

impl<'de> Deserialize<'de> for ArtifactProps {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<BTreeMap<String, Option<PropertyValue>>>::deserialize(deserializer)?
            .unwrap_or_default();
        let props = raw
            .into_iter()
            .map(|(key, value)| {
                let values = match value {
                    Some(PropertyValue::One(v)) => vec![v],
                    Some(PropertyValue::Many(v)) => v,
                    None => Vec::new(),
                };
                (key, values)
            })
            .collect();
        Ok(Self(props))
    }
}

impl ArtifactProps {
    pub fn new(props: BTreeMap<String, Vec<String>>) -> Self {
        Self(props)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All values of a property, empty when absent
    pub fn values(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a property
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// First value of a property or a default
    pub fn first_or(&self, key: &str, default: &str) -> String {
        self.first(key).unwrap_or(default).to_string()
    }

    /// Whether `<env>~<result>` history shows a result matching `passed` for `env`
    pub fn env_history_passed(&self, key: &str, env: &str, passed: impl Fn(&str) -> bool) -> bool {
        self.values(key).iter().any(|entry| {
            let mut parts = entry.split('~');
            matches!(
                (parts.next(), parts.next()),
                (Some(entry_env), Some(result)) if entry_env == env && passed(result)
            )
        })
    }
}
