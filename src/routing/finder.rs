//! Candidate discovery strategies
//!
//! A finder turns a request into a set of team ids using only the capability
//! index. Availability and exclusions are applied afterwards by the router.

use super::request::RouteRequest;
use crate::directory::CapabilityIndex;
use std::collections::{BTreeMap, BTreeSet};

/// A strategy for proposing candidate teams
pub trait CandidateFinder: Send + Sync {
    /// Short name recorded with the routing decision
    fn name(&self) -> &str;

    /// Team ids that could serve `request`
    fn find(&self, request: &RouteRequest, index: &CapabilityIndex) -> BTreeSet<String>;
}

/// Teams holding every required capability
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatchFinder;

impl CandidateFinder for CapabilityMatchFinder {
    fn name(&self) -> &str {
        "capability_match"
    }

    fn find(&self, request: &RouteRequest, index: &CapabilityIndex) -> BTreeSet<String> {
        let mut required = request
            .required_capabilities
            .iter()
            .filter(|capability| !capability.starts_with(super::request::EXCLUSION_PREFIX));

        let Some(first) = required.next() else {
            return BTreeSet::new();
        };

        let mut candidates = index.get(first).cloned().unwrap_or_default();
        for capability in required {
            if candidates.is_empty() {
                break;
            }
            match index.get(capability) {
                Some(team_ids) => candidates.retain(|team_id| team_ids.contains(team_id)),
                None => candidates.clear(),
            }
        }
        candidates
    }
}

/// Teams inferred from keywords in the task description
#[derive(Debug, Clone)]
pub struct KeywordFinder {
    table: BTreeMap<String, Vec<String>>,
}

impl Default for KeywordFinder {
    fn default() -> Self {
        Self::new(default_keyword_table())
    }
}

impl KeywordFinder {
    /// Keywords are matched case-insensitively
    pub fn new(table: BTreeMap<String, Vec<String>>) -> Self {
        let table = table
            .into_iter()
            .map(|(keyword, capabilities)| (keyword.to_lowercase(), capabilities))
            .collect();
        Self { table }
    }

    /// Built-in table unless `overrides` is non-empty
    pub fn from_config(overrides: &BTreeMap<String, Vec<String>>) -> Self {
        if overrides.is_empty() {
            Self::default()
        } else {
            Self::new(overrides.clone())
        }
    }

    /// Capabilities implied by the description
    pub fn inferred_capabilities(&self, description: &str) -> BTreeSet<String> {
        let description = description.to_lowercase();
        self.table
            .iter()
            .filter(|(keyword, _)| description.contains(keyword.as_str()))
            .flat_map(|(_, capabilities)| capabilities.iter().cloned())
            .collect()
    }
}

impl CandidateFinder for KeywordFinder {
    fn name(&self) -> &str {
        "keyword_inference"
    }

    fn find(&self, request: &RouteRequest, index: &CapabilityIndex) -> BTreeSet<String> {
        self.inferred_capabilities(&request.task_description)
            .iter()
            .filter_map(|capability| index.get(capability))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Department keywords and the capabilities they imply
pub fn default_keyword_table() -> BTreeMap<String, Vec<String>> {
    let entries: [(&str, &[&str]); 5] = [
        ("sales", &["sales", "customer-engagement", "proposal-generation"]),
        ("marketing", &["marketing", "content-creation", "campaign-management"]),
        ("technical", &["technical", "architecture", "development"]),
        ("product", &["product-management", "feature-planning", "roadmap"]),
        ("support", &["customer-support", "issue-resolution", "help-desk"]),
    ];

    entries
        .into_iter()
        .map(|(keyword, capabilities)| {
            (
                keyword.to_string(),
                capabilities.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}
