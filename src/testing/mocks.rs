//! Mock implementations for testing
//!
//! Provides an in-memory [`TeamStore`] that records every call and a
//! [`HealthProbe`] whose answers are scripted per URL, so the gateway can be
//! exercised without touching the filesystem or real team services.

use crate::directory::TeamRegistration;
use crate::health::{HealthProbe, ProbeOutcome};
use crate::storage::{RouteLogEntry, StoreError, StoreResult, TeamStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// In-memory store that records calls
#[derive(Debug, Default)]
pub struct MockTeamStore {
    teams: Mutex<BTreeMap<String, TeamRegistration>>,
    saved: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    routes: Mutex<Vec<RouteLogEntry>>,
    pub should_fail: bool,
}

impl MockTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails with an I/O error
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Pre-populated with registrations returned by `load_teams`
    pub fn with_teams(registrations: Vec<TeamRegistration>) -> Self {
        let store = Self::new();
        {
            let mut teams = store.teams.lock();
            for registration in registrations {
                teams.insert(registration.team_id.clone(), registration);
            }
        }
        store
    }

    pub fn saved_team_ids(&self) -> Vec<String> {
        self.saved.lock().clone()
    }

    pub fn deleted_team_ids(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    pub fn logged_routes(&self) -> Vec<RouteLogEntry> {
        self.routes.lock().clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.should_fail {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock store failure",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TeamStore for MockTeamStore {
    async fn save_team(&self, registration: &TeamRegistration) -> StoreResult<()> {
        self.check()?;
        self.saved.lock().push(registration.team_id.clone());
        self.teams
            .lock()
            .insert(registration.team_id.clone(), registration.clone());
        Ok(())
    }

    async fn delete_team(&self, team_id: &str) -> StoreResult<()> {
        self.check()?;
        self.deleted.lock().push(team_id.to_string());
        self.teams.lock().remove(team_id);
        Ok(())
    }

    async fn log_route(&self, entry: &RouteLogEntry) -> StoreResult<()> {
        self.check()?;
        self.routes.lock().push(entry.clone());
        Ok(())
    }

    async fn load_teams(&self) -> StoreResult<Vec<TeamRegistration>> {
        self.check()?;
        Ok(self.teams.lock().values().cloned().collect())
    }
}

/// Probe with per-URL scripted outcomes; unscripted URLs use the default
#[derive(Debug)]
pub struct ScriptedProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    default_outcome: ProbeOutcome,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProbe {
    /// Every URL answers healthy unless scripted otherwise
    pub fn new() -> Self {
        Self::with_default(ProbeOutcome::Healthy)
    }

    pub fn with_default(default_outcome: ProbeOutcome) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            default_outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, url: impl Into<String>, outcome: ProbeOutcome) {
        self.outcomes.lock().insert(url.into(), outcome);
    }

    /// URLs probed so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
        self.calls.lock().push(url.to_string());
        self.outcomes
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}
