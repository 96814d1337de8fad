//! Team registration and per-team runtime state

use super::circuit::{CircuitBreaker, CircuitPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Registration payload sent by a team
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamRegistration {
    pub team_id: String,
    pub team_name: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub department: String,
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_framework() -> String {
    "CrewAI".to_string()
}

impl TeamRegistration {
    /// Create a registration with the required fields
    pub fn new(
        team_id: impl Into<String>,
        team_name: impl Into<String>,
        endpoint: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: team_name.into(),
            endpoint: endpoint.into(),
            capabilities: Vec::new(),
            department: department.into(),
            framework: default_framework(),
            health_endpoint: None,
            metadata: HashMap::new(),
        }
    }

    /// Builder method to set capabilities for fluent construction
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    pub fn with_health_endpoint(mut self, health_endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(health_endpoint.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Health classification from periodic polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered team instance
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub team_id: String,
    pub display_name: String,
    pub endpoint: String,
    pub health_endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub department: String,
    pub framework: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub registered_at: DateTime<Utc>,

    pub status: HealthStatus,
    pub last_health_check: DateTime<Utc>,
    pub circuit: CircuitBreaker,

    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time_ms: f64,
}

impl TeamRecord {
    /// Build a fresh record; teams start healthy and freshly checked
    pub fn from_registration(
        registration: TeamRegistration,
        policy: CircuitPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let endpoint = registration.endpoint.trim_end_matches('/').to_string();
        let health_endpoint = registration
            .health_endpoint
            .unwrap_or_else(|| format!("{endpoint}/health"));

        Self {
            team_id: registration.team_id,
            display_name: registration.team_name,
            endpoint,
            health_endpoint,
            capabilities: registration.capabilities.into_iter().collect(),
            department: registration.department,
            framework: registration.framework,
            metadata: registration.metadata,
            registered_at: now,
            status: HealthStatus::Healthy,
            last_health_check: now,
            circuit: CircuitBreaker::new(policy),
            success_count: 0,
            error_count: 0,
            total_response_time_ms: 0.0,
        }
    }

    /// Registration payload that recreates this record
    pub fn to_registration(&self) -> TeamRegistration {
        TeamRegistration {
            team_id: self.team_id.clone(),
            team_name: self.display_name.clone(),
            endpoint: self.endpoint.clone(),
            capabilities: self.capabilities.iter().cloned().collect(),
            department: self.department.clone(),
            framework: self.framework.clone(),
            health_endpoint: Some(self.health_endpoint.clone()),
            metadata: self.metadata.clone(),
        }
    }

    /// URL tasks are posted to
    pub fn task_url(&self) -> String {
        format!("{}/task", self.endpoint)
    }

    pub fn total_requests(&self) -> u64 {
        self.success_count + self.error_count
    }

    /// Mean latency over all requests, 0 before the first request
    pub fn average_response_time_ms(&self) -> f64 {
        let total_requests = self.total_requests();
        if total_requests == 0 {
            return 0.0;
        }
        self.total_response_time_ms / total_requests as f64
    }

    /// Availability read; closes an expired circuit as a side effect
    pub fn is_available_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.circuit.try_close(now) {
            info!(team_id = %self.team_id, "Circuit breaker closed");
        }
        self.status == HealthStatus::Healthy && !self.circuit.open
    }

    pub fn is_available(&mut self) -> bool {
        self.is_available_at(Utc::now())
    }

    pub fn record_success(&mut self, latency_ms: f64) {
        self.success_count += 1;
        self.total_response_time_ms += latency_ms.max(0.0);
        self.circuit.record_success();
    }

    pub fn record_failure_at(&mut self, now: DateTime<Utc>) {
        self.error_count += 1;
        if self.circuit.record_failure(now) {
            warn!(
                team_id = %self.team_id,
                consecutive_failures = self.circuit.consecutive_failures,
                "Circuit breaker opened"
            );
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Utc::now())
    }

    /// Health probe answered 200
    pub fn mark_healthy(&mut self, now: DateTime<Utc>) {
        self.status = HealthStatus::Healthy;
        self.circuit.consecutive_failures = 0;
        self.last_health_check = now;
    }

    /// Health probe answered with a non-200 status
    pub fn mark_degraded(&mut self, now: DateTime<Utc>) {
        self.status = HealthStatus::Degraded;
        self.last_health_check = now;
    }

    /// Health probe failed outright; shares the failure streak with task routing
    pub fn mark_unhealthy(&mut self, now: DateTime<Utc>) {
        self.status = HealthStatus::Unhealthy;
        self.circuit.consecutive_failures = self.circuit.consecutive_failures.saturating_add(1);
        self.last_health_check = now;
    }

    /// Status view with availability evaluated at `now`
    pub fn status_view_at(&mut self, now: DateTime<Utc>) -> TeamStatusView {
        let is_available = self.is_available_at(now);
        TeamStatusView {
            team_id: self.team_id.clone(),
            team_name: self.display_name.clone(),
            endpoint: self.endpoint.clone(),
            health_endpoint: self.health_endpoint.clone(),
            capabilities: self.capabilities.iter().cloned().collect(),
            department: self.department.clone(),
            framework: self.framework.clone(),
            status: self.status,
            is_available,
            registered_at: self.registered_at.to_rfc3339(),
            health: TeamHealthView {
                last_check: self.last_health_check.to_rfc3339(),
                consecutive_failures: self.circuit.consecutive_failures,
                error_count: self.error_count,
                success_count: self.success_count,
                total_response_time_ms: round2(self.total_response_time_ms),
                average_response_time_ms: round2(self.average_response_time_ms()),
                circuit_breaker_open: self.circuit.open,
                circuit_opened_at: self.circuit.opened_at.map(|t| t.to_rfc3339()),
            },
            metadata: self.metadata.clone(),
        }
    }
}

/// Team status as returned by discovery endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamStatusView {
    pub team_id: String,
    pub team_name: String,
    pub endpoint: String,
    pub health_endpoint: String,
    pub capabilities: Vec<String>,
    pub department: String,
    pub framework: String,
    pub status: HealthStatus,
    pub is_available: bool,
    pub registered_at: String,
    pub health: TeamHealthView,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamHealthView {
    pub last_check: String,
    pub consecutive_failures: u32,
    pub error_count: u64,
    pub success_count: u64,
    pub total_response_time_ms: f64,
    pub average_response_time_ms: f64,
    pub circuit_breaker_open: bool,
    pub circuit_opened_at: Option<String>,
}

/// Round to two decimals for reporting
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
