//! Target selection for routed tasks

use super::finder::{CandidateFinder, CapabilityMatchFinder, KeywordFinder};
use super::request::RouteRequest;
use crate::directory::{Candidate, TeamDirectory};
use crate::error::{GatewayError, GatewayResult};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Strategy name for explicitly addressed tasks
pub const EXPLICIT_STRATEGY: &str = "explicit";

/// The team a task will be forwarded to
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTarget {
    pub team_id: String,
    pub endpoint: String,
    /// Which strategy produced the target
    pub strategy: String,
}

impl RouteTarget {
    pub fn task_url(&self) -> String {
        format!("{}/task", self.endpoint)
    }
}

/// Picks a target team using explicit addressing, then each finder in order
pub struct CapabilityRouter {
    directory: Arc<TeamDirectory>,
    finders: Vec<Box<dyn CandidateFinder>>,
}

impl CapabilityRouter {
    /// Capability intersection first, then keyword inference with `keywords`
    pub fn new(directory: Arc<TeamDirectory>, keywords: KeywordFinder) -> Self {
        Self::with_finders(
            directory,
            vec![Box::new(CapabilityMatchFinder), Box::new(keywords)],
        )
    }

    pub fn with_finders(
        directory: Arc<TeamDirectory>,
        finders: Vec<Box<dyn CandidateFinder>>,
    ) -> Self {
        Self { directory, finders }
    }

    pub fn directory(&self) -> &Arc<TeamDirectory> {
        &self.directory
    }

    /// Choose a target for `request`, skipping `excluded` teams in addition to
    /// the request's own exclusions
    pub fn select(
        &self,
        request: &RouteRequest,
        excluded: &BTreeSet<String>,
    ) -> GatewayResult<RouteTarget> {
        if let Some(team_id) = &request.to_team {
            return self.select_explicit(team_id);
        }

        let excluded: BTreeSet<String> = request
            .excluded_team_ids
            .union(excluded)
            .cloned()
            .collect();
        let index = self.directory.capabilities();

        for finder in &self.finders {
            let team_ids = finder.find(request, &index);
            if team_ids.is_empty() {
                debug!(strategy = finder.name(), "Strategy found no teams");
                continue;
            }

            let candidates = self
                .directory
                .available_candidates(&team_ids, &excluded, Utc::now());

            if let Some(best) = pick_fastest(candidates) {
                info!(
                    team_id = %best.team_id,
                    strategy = finder.name(),
                    avg_response_time_ms = best.average_response_time_ms,
                    "Selected target team"
                );
                return Ok(RouteTarget {
                    team_id: best.team_id,
                    endpoint: best.endpoint,
                    strategy: finder.name().to_string(),
                });
            }

            debug!(
                strategy = finder.name(),
                matched = team_ids.len(),
                "No matched team is available"
            );
        }

        warn!(
            from_team = %request.from_team,
            required_capabilities = ?request.required_capabilities,
            excluded = ?excluded,
            "No available team for task"
        );
        Err(GatewayError::no_available_team(
            "No available team found for the required capabilities",
        ))
    }

    fn select_explicit(&self, team_id: &str) -> GatewayResult<RouteTarget> {
        // Availability and endpoint are read under the same lock
        let endpoint = self
            .directory
            .update(team_id, |record| {
                record.is_available().then(|| record.endpoint.clone())
            })
            .ok()
            .flatten();

        match endpoint {
            Some(endpoint) => Ok(RouteTarget {
                team_id: team_id.to_string(),
                endpoint,
                strategy: EXPLICIT_STRATEGY.to_string(),
            }),
            None => {
                warn!(team_id = %team_id, "Requested team is not available");
                Err(GatewayError::team_unavailable(team_id))
            }
        }
    }
}

/// Lowest average latency wins; ties go to the smallest team id
fn pick_fastest(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.sort_by(|a, b| {
        a.average_response_time_ms
            .partial_cmp(&b.average_response_time_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.team_id.cmp(&b.team_id))
    });
    candidates.into_iter().next()
}
