//! Team directory: registrations, per-team health and circuit state, and the
//! capability index used for routing

pub mod circuit;
pub mod record;
pub mod registry;

pub use circuit::{CircuitBreaker, CircuitPolicy, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
pub use record::{HealthStatus, TeamHealthView, TeamRecord, TeamRegistration, TeamStatusView};
pub use registry::{Candidate, CapabilityIndex, HealthTarget, TeamDirectory};
