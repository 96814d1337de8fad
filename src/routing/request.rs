//! Inbound routing request

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Prefix that marks an exclusion token inside `required_capabilities`
pub const EXCLUSION_PREFIX: &str = "not:";

/// A task to be routed from one team to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRequest {
    pub from_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_team: Option<String>,
    pub task_description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub required_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_team_ids: BTreeSet<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Seconds the downstream team is given; the forwarder default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RouteRequest {
    pub fn new(from_team: impl Into<String>, task_description: impl Into<String>) -> Self {
        Self {
            from_team: from_team.into(),
            to_team: None,
            task_description: task_description.into(),
            required_capabilities: Vec::new(),
            excluded_team_ids: BTreeSet::new(),
            context: Map::new(),
            timeout: None,
        }
    }

    pub fn to_team(mut self, team_id: impl Into<String>) -> Self {
        self.to_team = Some(team_id.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding(mut self, team_id: impl Into<String>) -> Self {
        self.excluded_team_ids.insert(team_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    /// Move `not:<team_id>` tokens out of the capability list into the exclusion set.
    /// A blank `to_team` means capability routing.
    pub fn normalize(mut self) -> Self {
        self.to_team = self.to_team.filter(|team_id| !team_id.trim().is_empty());

        let mut capabilities = Vec::with_capacity(self.required_capabilities.len());
        for capability in self.required_capabilities {
            match capability.strip_prefix(EXCLUSION_PREFIX) {
                Some(team_id) if !team_id.is_empty() => {
                    self.excluded_team_ids.insert(team_id.to_string());
                }
                Some(_) => {}
                None => capabilities.push(capability),
            }
        }
        self.required_capabilities = capabilities;
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
