//! Periodic health polling of registered teams
//!
//! The monitor wakes up every `check_interval`, probes every team whose last
//! check is older than `stale_after`, and writes the outcome back into the
//! directory. Probes of one cycle run concurrently, each bounded by its own
//! timeout. A failing team never aborts the cycle.

use crate::directory::{HealthTarget, TeamDirectory};
use crate::error::GatewayResult;
use crate::health_span;
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Result of one probe against a team's health endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Endpoint answered 200
    Healthy,
    /// Endpoint answered with another status code
    Degraded(u16),
    /// Connection error or timeout
    Unreachable(String),
}

/// Something that can probe a health endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// Plain HTTP GET probe
#[derive(Debug, Clone, Default)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().as_u16() == 200 => ProbeOutcome::Healthy,
            Ok(response) => ProbeOutcome::Degraded(response.status().as_u16()),
            Err(e) if e.is_timeout() => {
                ProbeOutcome::Unreachable(format!("timed out after {}s", timeout.as_secs()))
            }
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

/// Background health poller over a shared directory
pub struct HealthMonitor {
    directory: Arc<TeamDirectory>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    stale_after: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        directory: Arc<TeamDirectory>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        stale_after: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            probe,
            interval,
            stale_after,
            probe_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe one team now, regardless of staleness
    pub async fn check_team(&self, team_id: &str) -> GatewayResult<ProbeOutcome> {
        let health_endpoint = self.directory.get(team_id)?.health_endpoint;
        let target = HealthTarget {
            team_id: team_id.to_string(),
            health_endpoint,
        };
        Ok(self.probe_and_apply(target).await)
    }

    /// One polling pass; returns how many teams were probed
    pub async fn run_cycle(&self) -> usize {
        let due = self
            .directory
            .due_for_health_check(self.stale_after, Utc::now());
        let probed = due.len();

        if probed > 0 {
            debug!(teams = probed, "Running health checks");
        }

        join_all(due.into_iter().map(|target| self.probe_and_apply(target))).await;
        probed
    }

    async fn probe_and_apply(&self, target: HealthTarget) -> ProbeOutcome {
        let span = health_span!(team_id = %target.team_id);

        async {
            let outcome = self
                .probe
                .probe(&target.health_endpoint, self.probe_timeout)
                .await;
            let now = Utc::now();

            let applied = self.directory.update(&target.team_id, |record| match &outcome {
                ProbeOutcome::Healthy => record.mark_healthy(now),
                ProbeOutcome::Degraded(_) => record.mark_degraded(now),
                ProbeOutcome::Unreachable(_) => record.mark_unhealthy(now),
            });

            if applied.is_err() {
                debug!("Team unregistered while its probe was in flight");
                return outcome;
            }

            match &outcome {
                ProbeOutcome::Healthy => {
                    metrics().health_check_completed(true);
                    debug!(status = "healthy", "Health check passed");
                }
                ProbeOutcome::Degraded(code) => {
                    metrics().health_check_completed(false);
                    warn!(status = "degraded", http_status = code, "Health check returned non-200");
                }
                ProbeOutcome::Unreachable(reason) => {
                    metrics().health_check_completed(false);
                    warn!(status = "unhealthy", error = %reason, "Health check failed");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health monitor stopped");
    }

    /// Spawn the polling loop as a background task
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
