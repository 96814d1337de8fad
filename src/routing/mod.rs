//! Task routing
//!
//! A [`RouteRequest`] is resolved to a [`RouteTarget`] by the
//! [`CapabilityRouter`]: an explicit `to_team` wins outright, otherwise each
//! [`CandidateFinder`] is tried in order and the fastest available team of
//! the first strategy with an available match is chosen.

pub mod finder;
pub mod request;
pub mod router;

pub use finder::{default_keyword_table, CandidateFinder, CapabilityMatchFinder, KeywordFinder};
pub use request::{RouteRequest, EXCLUSION_PREFIX};
pub use router::{CapabilityRouter, RouteTarget, EXPLICIT_STRATEGY};
