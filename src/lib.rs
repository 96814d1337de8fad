//! Team Gateway
//!
//! An inter-team routing gateway. Autonomous team services register with the
//! gateway, which indexes their capabilities, polls their health, opens a
//! circuit on teams that keep failing, and routes task requests among them
//! with automatic failover.
//!
//! # Overview
//!
//! - [`directory`]: team records, circuit breakers and the capability index
//! - [`health`]: periodic health polling
//! - [`routing`]: target selection by explicit team, capabilities or keywords
//! - [`forwarder`]: HTTP forwarding with retry on a different team
//! - [`stats`]: gateway and per-team statistics
//! - [`storage`]: best-effort durable mirror of registrations
//! - [`gateway`] and [`api`]: the service and its warp HTTP surface
//! - [`client`]: typed client and auto-registration for teams
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use team_gateway::directory::{TeamDirectory, TeamRegistration};
//! use team_gateway::routing::{CapabilityRouter, KeywordFinder, RouteRequest};
//!
//! let directory = Arc::new(TeamDirectory::new());
//! directory.register(
//!     TeamRegistration::new("sales-1", "Sales", "http://localhost:9001", "sales")
//!         .with_capabilities(["sales", "proposal-generation"]),
//! );
//!
//! let router = CapabilityRouter::new(directory, KeywordFinder::default());
//! let request = RouteRequest::new("marketing-1", "Draft a proposal")
//!     .with_capabilities(["proposal-generation"]);
//!
//! let target = router.select(&request, &BTreeSet::new()).unwrap();
//! assert_eq!(target.team_id, "sales-1");
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod health;
pub mod observability;
pub mod routing;
pub mod stats;
pub mod storage;
pub mod testing;

pub use client::{AutoRegistration, ClientError, GatewayClient};
pub use config::{ConfigError, GatewayConfig};
pub use directory::{HealthStatus, TeamDirectory, TeamRegistration, TeamStatusView};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use routing::RouteRequest;
