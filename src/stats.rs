//! Gateway-wide and per-team statistics

use crate::directory::record::round2;
use crate::directory::{HealthStatus, TeamDirectory};
use serde::{Deserialize, Serialize};

/// Full statistics report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayStats {
    pub gateway_stats: GatewaySummary,
    pub team_stats: Vec<TeamStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySummary {
    pub registered_teams: usize,
    pub healthy_teams: usize,
    pub total_capabilities: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_errors: u64,
    /// Percent, two decimals
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamStats {
    pub team_id: String,
    pub status: HealthStatus,
    pub requests: u64,
    /// Percent, two decimals
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
}

/// Read-only rollup over the directory
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn collect(directory: &TeamDirectory) -> GatewayStats {
        let records = directory.list(None);

        let team_stats: Vec<TeamStats> = records
            .iter()
            .map(|record| TeamStats {
                team_id: record.team_id.clone(),
                status: record.status,
                requests: record.total_requests(),
                success_rate: success_rate(record.success_count, record.total_requests()),
                avg_response_time_ms: round2(record.average_response_time_ms()),
            })
            .collect();

        let total_successes: u64 = records.iter().map(|r| r.success_count).sum();
        let total_errors: u64 = records.iter().map(|r| r.error_count).sum();
        let total_requests = total_successes + total_errors;

        GatewayStats {
            gateway_stats: GatewaySummary {
                registered_teams: records.len(),
                healthy_teams: records
                    .iter()
                    .filter(|r| r.status == HealthStatus::Healthy)
                    .count(),
                total_capabilities: directory.capability_count(),
                total_requests,
                total_successes,
                total_errors,
                success_rate: success_rate(total_successes, total_requests),
            },
            team_stats,
        }
    }
}

fn success_rate(successes: u64, requests: u64) -> f64 {
    if requests == 0 {
        return 0.0;
    }
    round2(successes as f64 / requests as f64 * 100.0)
}
