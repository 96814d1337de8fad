//! Testing utilities and mock implementations
//!
//! Mocks for the gateway's injected seams (store and health probe) so the
//! routing and lifecycle logic can be tested without files or live teams.

pub mod mocks;

pub use mocks::*;
