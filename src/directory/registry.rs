//! Thread-safe team directory with a capability index
//!
//! Records and the capability index live behind one directory-wide lock so
//! the index can never disagree with the record map. Availability reads may
//! close an expired circuit, so they take the write lock.

use super::circuit::CircuitPolicy;
use super::record::{TeamRecord, TeamRegistration, TeamStatusView};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// Capability -> ids of the teams that declared it
pub type CapabilityIndex = BTreeMap<String, BTreeSet<String>>;

/// An available team eligible for selection
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub team_id: String,
    pub endpoint: String,
    pub average_response_time_ms: f64,
}

/// A team whose health probe is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    pub team_id: String,
    pub health_endpoint: String,
}

#[derive(Debug, Default)]
struct DirectoryState {
    teams: HashMap<String, TeamRecord>,
    capability_index: CapabilityIndex,
}

impl DirectoryState {
    fn index_team(&mut self, record: &TeamRecord) {
        for capability in &record.capabilities {
            self.capability_index
                .entry(capability.clone())
                .or_default()
                .insert(record.team_id.clone());
        }
    }

    fn unindex_team(&mut self, record: &TeamRecord) {
        for capability in &record.capabilities {
            if let Some(team_ids) = self.capability_index.get_mut(capability) {
                team_ids.remove(&record.team_id);
                if team_ids.is_empty() {
                    self.capability_index.remove(capability);
                }
            }
        }
    }
}

/// Registry of teams shared by the router, forwarder and health monitor
#[derive(Debug, Default)]
pub struct TeamDirectory {
    state: RwLock<DirectoryState>,
    policy: CircuitPolicy,
}

impl TeamDirectory {
    /// Create an empty directory with the default circuit policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty directory whose records use `policy`
    pub fn with_circuit_policy(policy: CircuitPolicy) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            policy,
        }
    }

    pub fn circuit_policy(&self) -> CircuitPolicy {
        self.policy
    }

    /// Build a record from a registration and insert it
    pub fn register(&self, registration: TeamRegistration) -> Option<TeamRecord> {
        let record = TeamRecord::from_registration(registration, self.policy, Utc::now());
        self.insert(record)
    }

    /// Insert or overwrite a record; returns the record it replaced
    pub fn insert(&self, record: TeamRecord) -> Option<TeamRecord> {
        let team_id = record.team_id.clone();
        let mut state = self.state.write();

        let previous = state.teams.remove(&team_id);
        if let Some(ref old) = previous {
            state.unindex_team(old);
        }
        state.index_team(&record);
        state.teams.insert(team_id.clone(), record);

        if previous.is_some() {
            debug!(team_id = %team_id, "Replaced existing team registration");
        } else {
            info!(team_id = %team_id, "Registered new team");
        }

        previous
    }

    /// Remove a team and prune its capability entries
    pub fn unregister(&self, team_id: &str) -> GatewayResult<TeamRecord> {
        let mut state = self.state.write();
        let record = state
            .teams
            .remove(team_id)
            .ok_or_else(|| GatewayError::not_found(team_id))?;
        state.unindex_team(&record);

        info!(team_id = %team_id, "Unregistered team");
        Ok(record)
    }

    /// Snapshot of one record
    pub fn get(&self, team_id: &str) -> GatewayResult<TeamRecord> {
        self.state
            .read()
            .teams
            .get(team_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(team_id))
    }

    pub fn contains(&self, team_id: &str) -> bool {
        self.state.read().teams.contains_key(team_id)
    }

    /// Snapshot of all records, or those indexed under `capability`
    pub fn list(&self, capability: Option<&str>) -> Vec<TeamRecord> {
        let state = self.state.read();
        let mut records: Vec<TeamRecord> = match capability {
            Some(capability) => state
                .capability_index
                .get(capability)
                .into_iter()
                .flatten()
                .filter_map(|team_id| state.teams.get(team_id).cloned())
                .collect(),
            None => state.teams.values().cloned().collect(),
        };
        records.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        records
    }

    /// Full capability index
    pub fn capabilities(&self) -> CapabilityIndex {
        self.state.read().capability_index.clone()
    }

    /// Team ids indexed under one capability
    pub fn teams_with_capability(&self, capability: &str) -> BTreeSet<String> {
        self.state
            .read()
            .capability_index
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.read().teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capability_count(&self) -> usize {
        self.state.read().capability_index.len()
    }

    /// Apply `f` to one record under the write lock
    pub fn update<R>(&self, team_id: &str, f: impl FnOnce(&mut TeamRecord) -> R) -> GatewayResult<R> {
        let mut state = self.state.write();
        let record = state
            .teams
            .get_mut(team_id)
            .ok_or_else(|| GatewayError::not_found(team_id))?;
        Ok(f(record))
    }

    /// Availability read for one team; false for unknown teams
    pub fn is_available(&self, team_id: &str) -> bool {
        self.update(team_id, |record| record.is_available())
            .unwrap_or(false)
    }

    /// Status view of one team
    pub fn status(&self, team_id: &str) -> GatewayResult<TeamStatusView> {
        let now = Utc::now();
        self.update(team_id, |record| record.status_view_at(now))
    }

    /// Status views of all teams, or those indexed under `capability`
    pub fn statuses(&self, capability: Option<&str>) -> Vec<TeamStatusView> {
        let now = Utc::now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let team_ids: Vec<String> = match capability {
            Some(capability) => state
                .capability_index
                .get(capability)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut ids: Vec<String> = state.teams.keys().cloned().collect();
                ids.sort();
                ids
            }
        };

        let mut views = Vec::with_capacity(team_ids.len());
        for team_id in &team_ids {
            if let Some(record) = state.teams.get_mut(team_id) {
                views.push(record.status_view_at(now));
            }
        }
        views
    }

    /// Available, non-excluded teams among `team_ids`, evaluated under one lock
    pub fn available_candidates(
        &self,
        team_ids: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut state = self.state.write();
        team_ids
            .iter()
            .filter(|team_id| !excluded.contains(*team_id))
            .filter_map(|team_id| {
                let record = state.teams.get_mut(team_id)?;
                if !record.is_available_at(now) {
                    return None;
                }
                Some(Candidate {
                    team_id: record.team_id.clone(),
                    endpoint: record.endpoint.clone(),
                    average_response_time_ms: record.average_response_time_ms(),
                })
            })
            .collect()
    }

    /// Teams whose last health check is older than `stale_after`
    pub fn due_for_health_check(&self, stale_after: Duration, now: DateTime<Utc>) -> Vec<HealthTarget> {
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        let state = self.state.read();
        let mut targets: Vec<HealthTarget> = state
            .teams
            .values()
            .filter(|record| now.signed_duration_since(record.last_health_check) > stale_after)
            .map(|record| HealthTarget {
                team_id: record.team_id.clone(),
                health_endpoint: record.health_endpoint.clone(),
            })
            .collect();
        targets.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        targets
    }

    /// Registration payloads of every team, for mirroring
    pub fn registrations(&self) -> Vec<TeamRegistration> {
        self.list(None)
            .iter()
            .map(TeamRecord::to_registration)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(team_id: &str, capabilities: &[&str]) -> TeamRegistration {
        TeamRegistration::new(
            team_id,
            format!("Team {team_id}"),
            format!("http://{team_id}.local:9000"),
            "test",
        )
        .with_capabilities(capabilities.iter().copied())
    }

    #[test]
    fn test_register_and_get() {
        let directory = TeamDirectory::new();
        assert!(directory.is_empty());

        assert!(directory.register(registration("a", &["sales"])).is_none());

        let record = directory.get("a").unwrap();
        assert_eq!(record.team_id, "a");
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.teams_with_capability("sales").len(), 1);
    }

    #[test]
    fn test_get_unknown_team() {
        let directory = TeamDirectory::new();
        let err = directory.get("ghost").unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[test]
    fn test_reregistration_replaces_capabilities() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales", "crm"]));
        let previous = directory.register(registration("a", &["support"]));

        assert!(previous.is_some());
        let index = directory.capabilities();
        assert!(!index.contains_key("sales"));
        assert!(!index.contains_key("crm"));
        assert_eq!(index["support"], BTreeSet::from(["a".to_string()]));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_reregistration_keeps_other_teams_in_shared_capability() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales"]));
        directory.register(registration("b", &["sales"]));
        directory.register(registration("a", &["crm"]));

        assert_eq!(
            directory.teams_with_capability("sales"),
            BTreeSet::from(["b".to_string()])
        );
    }

    #[test]
    fn test_unregister_prunes_index() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["x", "shared"]));
        directory.register(registration("b", &["shared"]));

        directory.unregister("a").unwrap();

        let index = directory.capabilities();
        assert!(!index.contains_key("x"));
        assert_eq!(index["shared"], BTreeSet::from(["b".to_string()]));
    }

    #[test]
    fn test_unregister_unknown_team() {
        let directory = TeamDirectory::new();
        assert!(matches!(
            directory.unregister("ghost"),
            Err(GatewayError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_by_capability() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales"]));
        directory.register(registration("b", &["crm"]));
        directory.register(registration("c", &["sales", "crm"]));

        let ids: Vec<String> = directory
            .list(Some("sales"))
            .into_iter()
            .map(|r| r.team_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(directory.list(None).len(), 3);
        assert!(directory.list(Some("unknown")).is_empty());
    }

    #[test]
    fn test_update_records_counters() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales"]));

        directory.update("a", |r| r.record_success(40.0)).unwrap();
        directory.update("a", |r| r.record_failure()).unwrap();

        let record = directory.get("a").unwrap();
        assert_eq!(record.success_count, 1);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.average_response_time_ms(), 20.0);
    }

    #[test]
    fn test_available_candidates_filters_unavailable_and_excluded() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales"]));
        directory.register(registration("b", &["sales"]));
        directory.register(registration("c", &["sales"]));
        directory
            .update("b", |r| r.mark_unhealthy(Utc::now()))
            .unwrap();

        let ids = directory.teams_with_capability("sales");
        let excluded = BTreeSet::from(["c".to_string()]);
        let candidates = directory.available_candidates(&ids, &excluded, Utc::now());

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].team_id, "a");
    }

    #[test]
    fn test_due_for_health_check() {
        let directory = TeamDirectory::new();
        directory.register(registration("fresh", &["x"]));
        directory.register(registration("stale", &["x"]));
        directory
            .update("stale", |r| {
                r.last_health_check = Utc::now() - chrono::Duration::seconds(31)
            })
            .unwrap();

        let due = directory.due_for_health_check(Duration::from_secs(30), Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].team_id, "stale");
        assert_eq!(due[0].health_endpoint, "http://stale.local:9000/health");
    }

    #[test]
    fn test_statuses_apply_circuit_cooldown() {
        let directory = TeamDirectory::new();
        directory.register(registration("a", &["sales"]));
        let opened = Utc::now() - chrono::Duration::minutes(10);
        directory
            .update("a", |r| {
                for _ in 0..3 {
                    r.record_failure_at(opened);
                }
            })
            .unwrap();

        let statuses = directory.statuses(Some("sales"));
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].is_available);
        assert!(!directory.get("a").unwrap().circuit.open);
    }

    #[test]
    fn test_statuses_list_all_teams_sorted() {
        let directory = TeamDirectory::new();
        directory.register(registration("b", &["sales"]));
        directory.register(registration("a", &["crm"]));

        let ids: Vec<String> = directory
            .statuses(None)
            .into_iter()
            .map(|view| view.team_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(directory.statuses(Some("billing")).is_empty());
    }
}
