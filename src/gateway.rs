//! Gateway lifecycle and the operations exposed over HTTP
//!
//! [`Gateway`] wires the directory, health monitor, router, forwarder and
//! store together. Every component is constructed here and shared through
//! `Arc`; there is no process-wide directory.

use crate::config::GatewayConfig;
use crate::directory::{CircuitPolicy, TeamDirectory, TeamRegistration, TeamStatusView};
use crate::error::{GatewayError, GatewayResult};
use crate::forwarder::{ForwardingPolicy, TaskForwarder};
use crate::health::{HealthMonitor, HealthProbe, HttpHealthProbe, ProbeOutcome};
use crate::observability::metrics::metrics;
use crate::registration_span;
use crate::routing::{CapabilityRouter, KeywordFinder, RouteRequest};
use crate::stats::{GatewayStats, StatsAggregator};
use crate::storage::{JsonFileStore, NullStore, TeamStore};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Service name reported by the liveness endpoint
pub const SERVICE_NAME: &str = "team-gateway";

/// Answer to a successful registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrationAck {
    pub status: String,
    pub team_id: String,
    /// URL the team should use to reach the gateway
    pub gateway_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnregistrationAck {
    pub status: String,
    pub team_id: String,
}

/// Capability index as reported by `GET /capabilities`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilitiesReport {
    pub capabilities: Vec<String>,
    pub capability_count: usize,
    pub team_capabilities: BTreeMap<String, Vec<String>>,
}

/// Gateway liveness as reported by `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessReport {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub registered_teams: usize,
    pub total_capabilities: usize,
}

/// The routing gateway
pub struct Gateway {
    config: GatewayConfig,
    directory: Arc<TeamDirectory>,
    monitor: Arc<HealthMonitor>,
    forwarder: TaskForwarder,
    store: Arc<dyn TeamStore>,
    shutdown_tx: watch::Sender<bool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// Build a gateway with an HTTP probe and the store named by the config
    pub async fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        let store: Arc<dyn TeamStore> = match &config.storage.data_dir {
            Some(data_dir) => {
                info!(data_dir = %data_dir.display(), "Using JSON file store");
                Arc::new(
                    JsonFileStore::open(data_dir)
                        .await
                        .map_err(|e| e.into_gateway_error("open_store"))?,
                )
            }
            None => {
                info!("No data directory configured, registrations are kept in memory only");
                Arc::new(NullStore)
            }
        };

        let probe = Arc::new(HttpHealthProbe::new(build_http_client()?));
        Self::with_components(config, store, probe)
    }

    /// Build a gateway from explicit store and probe implementations
    pub fn with_components(
        config: GatewayConfig,
        store: Arc<dyn TeamStore>,
        probe: Arc<dyn HealthProbe>,
    ) -> GatewayResult<Self> {
        config.validate()?;

        let directory = Arc::new(TeamDirectory::with_circuit_policy(CircuitPolicy::new(
            config.circuit.failure_threshold,
            config.circuit_cooldown(),
        )));

        let monitor = Arc::new(HealthMonitor::new(
            directory.clone(),
            probe,
            config.check_interval(),
            config.stale_after(),
            config.probe_timeout(),
        ));

        let router = Arc::new(CapabilityRouter::new(
            directory.clone(),
            KeywordFinder::from_config(&config.routing.keywords),
        ));

        let forwarder = TaskForwarder::new(
            directory.clone(),
            router,
            build_http_client()?,
            store.clone(),
            ForwardingPolicy {
                max_retries: config.forwarding.max_retries,
                default_timeout: std::time::Duration::from_secs(
                    config.forwarding.default_timeout_secs,
                ),
            },
        );

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            directory,
            monitor,
            forwarder,
            store,
            shutdown_tx,
            monitor_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<TeamDirectory> {
        &self.directory
    }

    /// Restore persisted registrations and start the health monitor
    ///
    /// Returns how many teams were restored. A store that cannot be read is
    /// logged and treated as empty.
    pub async fn startup(&self) -> GatewayResult<usize> {
        let restored = match self.store.load_teams().await {
            Ok(registrations) => {
                let count = registrations.len();
                for registration in registrations {
                    self.directory.register(registration);
                }
                count
            }
            Err(e) => {
                let error = e.into_gateway_error("load_teams");
                warn!(error = %error, "Could not restore registrations");
                0
            }
        };

        if restored > 0 {
            info!(teams = restored, "Restored team registrations");
        }

        let mut handle = self.monitor_handle.lock();
        if handle.is_none() {
            *handle = Some(self.monitor.clone().spawn(self.shutdown_tx.subscribe()));
        }

        Ok(restored)
    }

    /// Stop the health monitor and wait for it to exit
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self.monitor_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
        info!("Gateway stopped");
    }

    /// Register or re-register a team, then probe it once
    pub async fn register(&self, registration: TeamRegistration) -> GatewayResult<RegistrationAck> {
        validate_registration(&registration)?;

        let team_id = registration.team_id.clone();
        let span = registration_span!(team_id = %team_id);

        async {
            let replaced = self.directory.register(registration.clone()).is_some();
            metrics().team_registered();
            info!(
                department = %registration.department,
                capabilities = ?registration.capabilities,
                replaced,
                "Team registered"
            );

            if let Err(e) = self.store.save_team(&registration).await {
                let error = e.into_gateway_error("save_team");
                warn!(error = %error, "Failed to persist registration");
            }

            match self.monitor.check_team(&team_id).await {
                Ok(ProbeOutcome::Healthy) => debug!("Initial health check passed"),
                Ok(outcome) => warn!(outcome = ?outcome, "Initial health check did not pass"),
                Err(e) => debug!(error = %e, "Team removed before its initial health check"),
            }

            Ok::<_, GatewayError>(RegistrationAck {
                status: "registered".to_string(),
                team_id: team_id.clone(),
                gateway_endpoint: self.config.server.public_url.clone(),
            })
        }
        .instrument(span)
        .await
    }

    /// Remove a team
    pub async fn unregister(&self, team_id: &str) -> GatewayResult<UnregistrationAck> {
        self.directory.unregister(team_id)?;
        metrics().team_unregistered();

        if let Err(e) = self.store.delete_team(team_id).await {
            let error = e.into_gateway_error("delete_team");
            warn!(team_id = %team_id, error = %error, "Failed to remove persisted registration");
        }

        Ok(UnregistrationAck {
            status: "unregistered".to_string(),
            team_id: team_id.to_string(),
        })
    }

    pub fn team(&self, team_id: &str) -> GatewayResult<TeamStatusView> {
        self.directory.status(team_id)
    }

    pub fn teams(&self, capability: Option<&str>) -> Vec<TeamStatusView> {
        self.directory.statuses(capability)
    }

    pub fn capabilities(&self) -> CapabilitiesReport {
        let index = self.directory.capabilities();
        CapabilitiesReport {
            capabilities: index.keys().cloned().collect(),
            capability_count: index.len(),
            team_capabilities: index
                .into_iter()
                .map(|(capability, team_ids)| (capability, team_ids.into_iter().collect()))
                .collect(),
        }
    }

    pub async fn route(&self, request: RouteRequest) -> GatewayResult<Value> {
        if request.from_team.trim().is_empty() {
            return Err(GatewayError::invalid_input("from_team must not be empty"));
        }
        self.forwarder.route(request).await
    }

    pub async fn proxy(&self, team_id: &str, body: Value) -> GatewayResult<Value> {
        self.forwarder.proxy(team_id, body).await
    }

    pub fn stats(&self) -> GatewayStats {
        StatsAggregator::collect(&self.directory)
    }

    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            registered_teams: self.directory.len(),
            total_capabilities: self.directory.capability_count(),
        }
    }
}

fn build_http_client() -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("team-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatewayError::internal_error(format!("Failed to build HTTP client: {e}")))
}

/// Team ids are limited to ASCII alphanumerics plus `.`, `_` and `-`
pub fn validate_team_id(team_id: &str) -> GatewayResult<()> {
    if team_id.is_empty() {
        return Err(GatewayError::invalid_input("team_id must not be empty"));
    }

    if let Some(ch) = team_id
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && !matches!(ch, '.' | '_' | '-'))
    {
        return Err(GatewayError::invalid_input(format!(
            "team_id contains invalid character: '{ch}'"
        )));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> GatewayResult<()> {
    let url = url::Url::parse(value)
        .map_err(|e| GatewayError::invalid_input(format!("{field} is not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GatewayError::invalid_input(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}

fn validate_registration(registration: &TeamRegistration) -> GatewayResult<()> {
    validate_team_id(&registration.team_id)?;
    validate_http_url("endpoint", &registration.endpoint)?;
    if let Some(health_endpoint) = &registration.health_endpoint {
        validate_http_url("health_endpoint", health_endpoint)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockTeamStore, ScriptedProbe};

    fn gateway(store: Arc<MockTeamStore>) -> Gateway {
        Gateway::with_components(
            GatewayConfig::default(),
            store,
            Arc::new(ScriptedProbe::new()),
        )
        .unwrap()
    }

    fn registration(team_id: &str) -> TeamRegistration {
        TeamRegistration::new(team_id, "Team", "http://localhost:9001", "sales")
            .with_capabilities(["sales", "crm"])
    }

    #[test]
    fn test_validate_team_id() {
        assert!(validate_team_id("sales-team_1.v2").is_ok());
        assert!(validate_team_id("").is_err());
        assert!(validate_team_id("sales/team").is_err());
        assert!(validate_team_id("sales team").is_err());
    }

    #[test]
    fn test_validate_urls() {
        assert!(validate_http_url("endpoint", "https://team.internal:8443").is_ok());
        assert!(validate_http_url("endpoint", "team.internal").is_err());
        assert!(validate_http_url("endpoint", "ftp://team.internal").is_err());
    }

    #[tokio::test]
    async fn test_register_persists_and_acks() {
        let store = Arc::new(MockTeamStore::new());
        let gateway = gateway(store.clone());

        let ack = gateway.register(registration("sales-1")).await.unwrap();
        assert_eq!(ack.status, "registered");
        assert_eq!(ack.team_id, "sales-1");
        assert_eq!(ack.gateway_endpoint, "http://localhost:8080");
        assert_eq!(store.saved_team_ids(), vec!["sales-1"]);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_endpoint() {
        let gateway = gateway(Arc::new(MockTeamStore::new()));
        let mut bad = registration("sales-1");
        bad.endpoint = "not a url".to_string();

        let err = gateway.register(bad).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(gateway.directory().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_registration() {
        let store = Arc::new(MockTeamStore::failing());
        let gateway = gateway(store);

        assert!(gateway.register(registration("sales-1")).await.is_ok());
        assert!(gateway.unregister("sales-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_startup_restores_and_shutdown_stops() {
        let store = Arc::new(MockTeamStore::with_teams(vec![registration("restored")]));
        let gateway = gateway(store);

        assert_eq!(gateway.startup().await.unwrap(), 1);
        assert!(gateway.team("restored").unwrap().is_available);

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_capabilities_report() {
        let gateway = gateway(Arc::new(MockTeamStore::new()));
        gateway.register(registration("a")).await.unwrap();

        let report = gateway.capabilities();
        assert_eq!(report.capabilities, vec!["crm", "sales"]);
        assert_eq!(report.capability_count, 2);
        assert_eq!(report.team_capabilities["crm"], vec!["a"]);
    }

    #[tokio::test]
    async fn test_liveness() {
        let gateway = gateway(Arc::new(MockTeamStore::new()));
        gateway.register(registration("a")).await.unwrap();

        let report = gateway.liveness();
        assert_eq!(report.status, "healthy");
        assert_eq!(report.service, SERVICE_NAME);
        assert_eq!(report.registered_teams, 1);
        assert_eq!(report.total_capabilities, 2);
    }
}
