//! Prometheus file_sd data model

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type Labels = BTreeMap<String, String>;

/// One discovery unit: a set of addresses sharing a label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    /// Missing and `null` both mean no labels.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Labels,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Labels, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Labels>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered list of target groups as returned by the discovery endpoint.
///
/// Built fresh for every poll cycle and dropped when the cycle ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryResponse {
    groups: Vec<TargetGroup>,
}

impl DiscoveryResponse {
    pub fn new(groups: Vec<TargetGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[TargetGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Copy every static label into every group. Static values replace
    /// upstream values on key conflict.
    pub fn with_static_labels(mut self, labels: &Labels) -> Self {
        for group in &mut self.groups {
            for (key, value) in labels {
                group.labels.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
