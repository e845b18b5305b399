//! This module defines the configuration file.

use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Names of the containers that receive the node environment secret.
    /// Matching is by exact container name, for init containers and regular containers alike.
    #[serde(default)]
    pub containers_allowed: BTreeSet<String>,
}

impl Config {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(file_path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(file_path)?;
        Self::from_str(&config_content)
    }

    #[cfg(test)]
    pub fn with_containers_allowed<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers_allowed: containers.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a container with this name may be patched.
    pub fn is_container_allowed(&self, container_name: &str) -> bool {
        self.containers_allowed.contains(container_name)
    }
}
