//! Best-effort durable mirror of registrations and routing decisions
//!
//! The directory is always the source of truth while the process runs. A
//! store only lets registrations survive a restart and keeps an audit trail
//! of routing decisions; store failures are logged and never fail the
//! operation that triggered the write.

pub mod file_store;

pub use file_store::JsonFileStore;

use crate::directory::TeamRegistration;
use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest task description kept in a route log entry
pub const MAX_LOGGED_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wrap as a gateway error naming the failed operation
    pub fn into_gateway_error(self, operation: &str) -> GatewayError {
        GatewayError::persistence_failure(operation, self.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One routing decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteLogEntry {
    pub route_id: Uuid,
    pub from_team: String,
    pub to_team: String,
    pub task_description: String,
    pub required_capabilities: Vec<String>,
    pub routed_at: DateTime<Utc>,
}

impl RouteLogEntry {
    pub fn new(
        from_team: impl Into<String>,
        to_team: impl Into<String>,
        task_description: &str,
        required_capabilities: Vec<String>,
    ) -> Self {
        Self {
            route_id: Uuid::new_v4(),
            from_team: from_team.into(),
            to_team: to_team.into(),
            task_description: task_description
                .chars()
                .take(MAX_LOGGED_DESCRIPTION_CHARS)
                .collect(),
            required_capabilities,
            routed_at: Utc::now(),
        }
    }
}

/// Durable mirror of the directory
#[async_trait]
pub trait TeamStore: Send + Sync {
    /// Insert or replace a registration
    async fn save_team(&self, registration: &TeamRegistration) -> StoreResult<()>;

    /// Forget a registration; missing ids are not an error
    async fn delete_team(&self, team_id: &str) -> StoreResult<()>;

    /// Append a routing decision
    async fn log_route(&self, entry: &RouteLogEntry) -> StoreResult<()>;

    /// Every stored registration
    async fn load_teams(&self) -> StoreResult<Vec<TeamRegistration>>;
}

/// Store that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl TeamStore for NullStore {
    async fn save_team(&self, _registration: &TeamRegistration) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_team(&self, _team_id: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn log_route(&self, _entry: &RouteLogEntry) -> StoreResult<()> {
        Ok(())
    }

    async fn load_teams(&self) -> StoreResult<Vec<TeamRegistration>> {
        Ok(Vec::new())
    }
}
