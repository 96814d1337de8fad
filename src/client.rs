//! Typed HTTP client for teams talking to the gateway
//!
//! [`GatewayClient`] wraps every gateway endpoint. [`AutoRegistration`]
//! waits for the gateway to come up and then registers a team, logging
//! instead of failing when the gateway never answers.
//!
//! Environment:
//! - `A2A_GATEWAY_URL`: gateway used by [`GatewayClient::from_env`]
//! - `DISABLE_GATEWAY_REGISTRATION=true`: auto-registration is skipped

use crate::directory::{TeamRegistration, TeamStatusView};
use crate::error::ErrorResponse;
use crate::gateway::{CapabilitiesReport, LivenessReport, RegistrationAck, UnregistrationAck};
use crate::routing::RouteRequest;
use crate::stats::GatewayStats;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Timeout of the gateway liveness check
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout of every other control-plane call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const GATEWAY_URL_ENV: &str = "A2A_GATEWAY_URL";
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
pub const DISABLE_REGISTRATION_ENV: &str = "DISABLE_GATEWAY_REGISTRATION";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {detail}")]
    Api {
        status: u16,
        kind: Option<String>,
        detail: String,
    },
}

impl ClientError {
    /// HTTP status for errors the gateway answered with
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::InvalidUrl(_) => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client for one gateway
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: Url,
    client: Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Client for `A2A_GATEWAY_URL`, or the local gateway when unset
    pub fn from_env() -> ClientResult<Self> {
        Self::new(&gateway_url_from_env())
    }

    pub fn with_client(base_url: &str, client: Client) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ClientResult<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> ClientResult<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn register_team(
        &self,
        registration: &TeamRegistration,
    ) -> ClientResult<RegistrationAck> {
        self.post("register", registration, REQUEST_TIMEOUT).await
    }

    pub async fn unregister_team(&self, team_id: &str) -> ClientResult<UnregistrationAck> {
        let response = self
            .client
            .delete(self.url(&format!("teams/{team_id}"))?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        decode(response).await
    }

    /// Route a task; the client waits as long as the downstream team may take
    pub async fn route_task(&self, request: &RouteRequest) -> ClientResult<Value> {
        let timeout = request
            .timeout
            .map(|secs| Duration::from_secs(secs) + REQUEST_TIMEOUT)
            .unwrap_or(Duration::from_secs(3600) + REQUEST_TIMEOUT);
        self.post("route", request, timeout).await
    }

    pub async fn discover_teams(&self, capability: Option<&str>) -> ClientResult<Vec<TeamStatusView>> {
        match capability {
            Some(capability) => self.get("teams", &[("capability", capability)]).await,
            None => self.get("teams", &[]).await,
        }
    }

    pub async fn team_status(&self, team_id: &str) -> ClientResult<TeamStatusView> {
        self.get(&format!("teams/{team_id}"), &[]).await
    }

    pub async fn capabilities(&self) -> ClientResult<CapabilitiesReport> {
        self.get("capabilities", &[]).await
    }

    pub async fn statistics(&self) -> ClientResult<GatewayStats> {
        self.get("stats", &[]).await
    }

    pub async fn liveness(&self) -> ClientResult<LivenessReport> {
        let response = self
            .client
            .get(self.url("health")?)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await?;
        decode(response).await
    }

    /// True when the gateway answers its health endpoint with 200
    pub async fn health_check(&self) -> bool {
        let Ok(url) = self.url("health") else {
            return false;
        };
        match self
            .client
            .get(url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                debug!(error = %e, "Gateway health check failed");
                false
            }
        }
    }
}

/// Gateway URL from the environment, falling back to [`DEFAULT_GATEWAY_URL`]
pub fn gateway_url_from_env() -> String {
    std::env::var(GATEWAY_URL_ENV)
        .ok()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
}

/// Whether `DISABLE_GATEWAY_REGISTRATION` opts this process out of auto-registration
pub fn registration_disabled() -> bool {
    std::env::var(DISABLE_REGISTRATION_ENV)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let (kind, detail) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (Some(body.error), body.detail),
        Err(_) => (None, text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        kind,
        detail,
    })
}

/// Registers a team once the gateway is reachable
#[derive(Debug, Clone)]
pub struct AutoRegistration {
    client: GatewayClient,
    registration: TeamRegistration,
    max_attempts: u32,
    poll_interval: Duration,
}

impl AutoRegistration {
    /// Up to 10 health polls, 5 seconds apart
    pub fn new(client: GatewayClient, registration: TeamRegistration) -> Self {
        Self {
            client,
            registration,
            max_attempts: 10,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_polling(mut self, max_attempts: u32, poll_interval: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.poll_interval = poll_interval;
        self
    }

    async fn wait_for_gateway(&self) -> bool {
        for attempt in 1..=self.max_attempts {
            if self.client.health_check().await {
                return true;
            }
            debug!(attempt, max_attempts = self.max_attempts, "Gateway not ready yet");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        false
    }

    pub fn registration(&self) -> &TeamRegistration {
        &self.registration
    }

    /// Wait for the gateway and register; returns whether registration succeeded
    pub async fn run(&self) -> bool {
        let team_id = &self.registration.team_id;

        if registration_disabled() {
            info!(team_id = %team_id, "Gateway registration disabled by environment");
            return false;
        }

        if !self.wait_for_gateway().await {
            warn!(
                team_id = %team_id,
                gateway = %self.client.base_url(),
                "Gateway not reachable, continuing without registration"
            );
            return false;
        }

        match self.client.register_team(&self.registration).await {
            Ok(ack) => {
                info!(team_id = %team_id, gateway_endpoint = %ack.gateway_endpoint, "Registered with gateway");
                true
            }
            Err(e) => {
                warn!(team_id = %team_id, error = %e, "Registration with gateway failed");
                false
            }
        }
    }

    /// Remove the team from the gateway on shutdown; failures are only logged
    pub async fn unregister(&self) -> bool {
        let team_id = &self.registration.team_id;
        match self.client.unregister_team(team_id).await {
            Ok(_) => {
                info!(team_id = %team_id, "Unregistered from gateway");
                true
            }
            Err(e) => {
                warn!(team_id = %team_id, error = %e, "Unregistration from gateway failed");
                false
            }
        }
    }

    /// Run in the background
    pub fn spawn(self) -> JoinHandle<bool> {
        tokio::spawn(async move { self.run().await })
    }
}
