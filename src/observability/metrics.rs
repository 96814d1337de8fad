//! Thread-safe metrics collection system
//!
//! Process-wide atomic counters for routing, proxying, health probing and
//! registration activity. Per-team counters live on the team records; these
//! are the gateway-level totals exported by `GET /metrics`.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and a mutex-protected sample window
pub struct MetricsCollector {
    // Routing
    routes_requested: AtomicU64,
    routes_succeeded: AtomicU64,
    routes_failed: AtomicU64,
    route_retries: AtomicU64,
    no_candidate: AtomicU64,
    proxy_requests: AtomicU64,
    proxy_failures: AtomicU64,

    // Health monitor
    health_checks: AtomicU64,
    health_check_failures: AtomicU64,
    circuits_opened: AtomicU64,

    // Directory
    registrations: AtomicU64,
    unregistrations: AtomicU64,

    forward_times: Mutex<Vec<u64>>, // in milliseconds
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            routes_requested: AtomicU64::new(0),
            routes_succeeded: AtomicU64::new(0),
            routes_failed: AtomicU64::new(0),
            route_retries: AtomicU64::new(0),
            no_candidate: AtomicU64::new(0),
            proxy_requests: AtomicU64::new(0),
            proxy_failures: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            health_check_failures: AtomicU64::new(0),
            circuits_opened: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            unregistrations: AtomicU64::new(0),
            forward_times: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Routing metrics
    pub fn route_requested(&self) {
        self.routes_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_succeeded(&self, duration: Duration) {
        self.routes_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_forward_time(duration);
    }

    pub fn route_failed(&self) {
        self.routes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_retried(&self) {
        self.route_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn no_candidate(&self) {
        self.no_candidate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn proxy_requested(&self) {
        self.proxy_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn proxy_failed(&self) {
        self.proxy_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_forward_time(&self, duration: Duration) {
        if let Ok(mut times) = self.forward_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_LATENCY_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Health metrics
    pub fn health_check_completed(&self, healthy: bool) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        if !healthy {
            self.health_check_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn circuit_opened(&self) {
        self.circuits_opened.fetch_add(1, Ordering::Relaxed);
    }

    // Directory metrics
    pub fn team_registered(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn team_unregistered(&self) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.routes_requested,
            &self.routes_succeeded,
            &self.routes_failed,
            &self.route_retries,
            &self.no_candidate,
            &self.proxy_requests,
            &self.proxy_failures,
            &self.health_checks,
            &self.health_check_failures,
            &self.circuits_opened,
            &self.registrations,
            &self.unregistrations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut times) = self.forward_times.lock() {
            times.clear();
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Average and percentiles of successful forward latency
    fn forward_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.forward_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_forward_time_ms, p50, p95) = self.forward_time_statistics();

        MetricsSnapshot {
            routing: RoutingMetrics {
                routes_requested: self.routes_requested.load(Ordering::Relaxed),
                routes_succeeded: self.routes_succeeded.load(Ordering::Relaxed),
                routes_failed: self.routes_failed.load(Ordering::Relaxed),
                route_retries: self.route_retries.load(Ordering::Relaxed),
                no_candidate: self.no_candidate.load(Ordering::Relaxed),
                proxy_requests: self.proxy_requests.load(Ordering::Relaxed),
                proxy_failures: self.proxy_failures.load(Ordering::Relaxed),
                avg_forward_time_ms,
                forward_time_p50_ms: p50,
                forward_time_p95_ms: p95,
            },
            health: HealthMetrics {
                health_checks: self.health_checks.load(Ordering::Relaxed),
                health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
                circuits_opened: self.circuits_opened.load(Ordering::Relaxed),
            },
            directory: DirectoryMetrics {
                registrations: self.registrations.load(Ordering::Relaxed),
                unregistrations: self.unregistrations.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub routing: RoutingMetrics,
    pub health: HealthMetrics,
    pub directory: DirectoryMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetrics {
    pub routes_requested: u64,
    pub routes_succeeded: u64,
    pub routes_failed: u64,
    pub route_retries: u64,
    pub no_candidate: u64,
    pub proxy_requests: u64,
    pub proxy_failures: u64,
    pub avg_forward_time_ms: f64,
    pub forward_time_p50_ms: f64,
    pub forward_time_p95_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub health_checks: u64,
    pub health_check_failures: u64,
    pub circuits_opened: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryMetrics {
    pub registrations: u64,
    pub unregistrations: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn percentile(sorted_values: &[u64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_values.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_values[lower] as f64
    } else {
        let weight = index - lower as f64;
        sorted_values[lower] as f64 * (1.0 - weight) + sorted_values[upper] as f64 * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_counters() {
        let collector = MetricsCollector::new();

        collector.route_requested();
        collector.route_requested();
        collector.route_succeeded(Duration::from_millis(100));
        collector.route_failed();
        collector.route_retried();
        collector.no_candidate();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.routing.routes_requested, 2);
        assert_eq!(snapshot.routing.routes_succeeded, 1);
        assert_eq!(snapshot.routing.routes_failed, 1);
        assert_eq!(snapshot.routing.route_retries, 1);
        assert_eq!(snapshot.routing.no_candidate, 1);
        assert_eq!(snapshot.routing.avg_forward_time_ms, 100.0);
    }

    #[test]
    fn test_health_counters() {
        let collector = MetricsCollector::new();

        collector.health_check_completed(true);
        collector.health_check_completed(false);
        collector.circuit_opened();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.health.health_checks, 2);
        assert_eq!(snapshot.health.health_check_failures, 1);
        assert_eq!(snapshot.health.circuits_opened, 1);
    }

    #[test]
    fn test_forward_time_percentiles() {
        let collector = MetricsCollector::new();
        for ms in [10, 20, 30, 40, 50] {
            collector.route_succeeded(Duration::from_millis(ms));
        }

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.routing.avg_forward_time_ms, 30.0);
        assert_eq!(snapshot.routing.forward_time_p50_ms, 30.0);
        assert_eq!(snapshot.routing.forward_time_p95_ms, 48.0);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let collector = MetricsCollector::new();
        for _ in 0..(MAX_LATENCY_SAMPLES + 10) {
            collector.route_succeeded(Duration::from_millis(1));
        }
        assert_eq!(
            collector.forward_times.lock().unwrap().len(),
            MAX_LATENCY_SAMPLES
        );
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.team_registered();
        collector.proxy_requested();
        collector.reset();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.directory.registrations, 0);
        assert_eq!(snapshot.routing.proxy_requests, 0);
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7], 99.0), 7.0);
        assert_eq!(percentile(&[1, 3], 50.0), 2.0);
    }
}
