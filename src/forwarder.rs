//! Task forwarding with failover
//!
//! A routed task is sent to the target chosen by the [`CapabilityRouter`].
//! When a capability-routed forward fails, the failed team is excluded and
//! the router is consulted again, up to `max_retries` times. Explicitly
//! addressed tasks are never retried.

use crate::directory::record::round2;
use crate::directory::TeamDirectory;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics::metrics;
use crate::route_span;
use crate::routing::{CapabilityRouter, RouteRequest, RouteTarget};
use crate::storage::{RouteLogEntry, TeamStore};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Task type stamped on every routed payload
pub const ROUTED_TASK_TYPE: &str = "routed_task";

/// Forwarding limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingPolicy {
    /// Re-routes allowed after a failed capability-routed forward
    pub max_retries: u32,
    /// Timeout used when a request does not carry one
    pub default_timeout: Duration,
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            default_timeout: Duration::from_secs(3600),
        }
    }
}

/// Sends tasks to teams and records the outcome on the directory
pub struct TaskForwarder {
    directory: Arc<TeamDirectory>,
    router: Arc<CapabilityRouter>,
    client: reqwest::Client,
    store: Arc<dyn TeamStore>,
    policy: ForwardingPolicy,
}

impl TaskForwarder {
    pub fn new(
        directory: Arc<TeamDirectory>,
        router: Arc<CapabilityRouter>,
        client: reqwest::Client,
        store: Arc<dyn TeamStore>,
        policy: ForwardingPolicy,
    ) -> Self {
        Self {
            directory,
            router,
            client,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> ForwardingPolicy {
        self.policy
    }

    /// Route a task and forward it, failing over once per allowed retry
    pub async fn route(&self, request: RouteRequest) -> GatewayResult<Value> {
        let request = request.normalize();
        let span = route_span!(
            from_team = %request.from_team,
            to_team = request.to_team.as_deref().unwrap_or("")
        );

        self.route_inner(request).instrument(span).await
    }

    async fn route_inner(&self, request: RouteRequest) -> GatewayResult<Value> {
        metrics().route_requested();
        let started = Instant::now();
        let timeout = self.effective_timeout(request.timeout);
        let mut excluded = BTreeSet::new();
        let mut retries = 0;

        loop {
            let target = match self.router.select(&request, &excluded) {
                Ok(target) => target,
                Err(e) => {
                    metrics().no_candidate();
                    metrics().route_failed();
                    return Err(e);
                }
            };

            self.log_route(&request, &target);

            let payload = routed_payload(&request, &target, timeout);
            match self.send_task(&target.task_url(), &payload, timeout).await {
                Ok((body, latency_ms)) => {
                    self.record_success(&target.team_id, latency_ms);
                    metrics().route_succeeded(started.elapsed());

                    let routing_time_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
                    info!(
                        team_id = %target.team_id,
                        strategy = %target.strategy,
                        latency_ms = round2(latency_ms),
                        retries,
                        "Task forwarded"
                    );
                    return Ok(annotate(body, &target.team_id, routing_time_ms));
                }
                Err(reason) => {
                    self.record_failure(&target.team_id);
                    warn!(team_id = %target.team_id, error = %reason, "Forwarding failed");

                    if request.to_team.is_none() && retries < self.policy.max_retries {
                        retries += 1;
                        metrics().route_retried();
                        excluded.insert(target.team_id);
                        debug!(retries, "Re-routing task");
                        continue;
                    }

                    metrics().route_failed();
                    return Err(GatewayError::downstream_failure(target.team_id, reason));
                }
            }
        }
    }

    /// Forward a raw body to one team's task endpoint, without routing or retry
    pub async fn proxy(&self, team_id: &str, body: Value) -> GatewayResult<Value> {
        metrics().proxy_requested();

        let record = self.directory.get(team_id)?;
        if !self.directory.is_available(team_id) {
            metrics().proxy_failed();
            return Err(GatewayError::team_unavailable(team_id));
        }

        let timeout = self.effective_timeout(body.get("timeout").and_then(Value::as_u64));
        match self.send_task(&record.task_url(), &body, timeout).await {
            Ok((response, latency_ms)) => {
                self.record_success(team_id, latency_ms);
                debug!(team_id = %team_id, latency_ms = round2(latency_ms), "Proxied task");
                Ok(response)
            }
            Err(reason) => {
                self.record_failure(team_id);
                metrics().proxy_failed();
                warn!(team_id = %team_id, error = %reason, "Proxy request failed");
                Err(GatewayError::downstream_failure(team_id, reason))
            }
        }
    }

    fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        requested_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.policy.default_timeout)
    }

    /// POST `payload`; success means a 2xx answer with a JSON body
    async fn send_task(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<(Value, f64), String> {
        let started = Instant::now();

        let response = self
            .client
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("invalid JSON response: {e}"))?;

        Ok((body, started.elapsed().as_secs_f64() * 1000.0))
    }

    fn record_success(&self, team_id: &str, latency_ms: f64) {
        if self
            .directory
            .update(team_id, |record| record.record_success(latency_ms))
            .is_err()
        {
            debug!(team_id = %team_id, "Team unregistered before its result was recorded");
        }
    }

    fn record_failure(&self, team_id: &str) {
        let opened = self.directory.update(team_id, |record| {
            let was_open = record.circuit.open;
            record.record_failure();
            !was_open && record.circuit.open
        });
        if let Ok(true) = opened {
            metrics().circuit_opened();
        }
    }

    /// Audit the routing decision without delaying the forward
    fn log_route(&self, request: &RouteRequest, target: &RouteTarget) {
        let entry = RouteLogEntry::new(
            request.from_team.clone(),
            target.team_id.clone(),
            &request.task_description,
            request.required_capabilities.clone(),
        );
        let store = self.store.clone();

        tokio::spawn(async move {
            if let Err(e) = store.log_route(&entry).await {
                let error = e.into_gateway_error("log_route");
                warn!(route_id = %entry.route_id, error = %error, "Failed to log routing decision");
            }
        });
    }
}

/// Payload a downstream team receives for a routed task
fn routed_payload(request: &RouteRequest, target: &RouteTarget, timeout: Duration) -> Value {
    json!({
        "from_agent": request.from_team,
        "to_agent": target.team_id,
        "task_type": ROUTED_TASK_TYPE,
        "task_description": request.task_description,
        "context": request.context,
        "timeout": timeout.as_secs(),
    })
}

/// Add `routed_to` and `routing_time_ms`; non-object bodies are wrapped under `result`
fn annotate(body: Value, team_id: &str, routing_time_ms: f64) -> Value {
    let mut object = match body {
        Value::Object(object) => object,
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("result".to_string(), other);
            wrapped
        }
    };
    object.insert("routed_to".to_string(), Value::from(team_id));
    object.insert("routing_time_ms".to_string(), Value::from(routing_time_ms));
    Value::Object(object)
}
