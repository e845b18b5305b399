//! Projection of node labels into container environment variables.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

use crate::consts::ENV_NODE_PREFIX;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z0-9]+").expect("valid regex"));

/// Turn a node label key into an environment variable name.
/// The key is prefixed with `NODE_`, every run of non alphanumeric characters becomes a single `_`
/// and the result is uppercased.
pub fn env_name(label_key: &str) -> String {
    let prefixed = format!("{ENV_NODE_PREFIX}{label_key}");
    NON_ALPHANUMERIC
        .replace_all(&prefixed, "_")
        .to_uppercase()
}

/// Map node labels to environment variables.
///
/// Labels are visited in key order, so when two keys normalize to the same name the
/// lexicographically last key wins.
pub fn env_from_node_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(key, value)| (env_name(key), value.clone()))
        .collect()
}
