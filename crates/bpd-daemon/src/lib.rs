//! bpd-daemon library target.
//!
//! Exposes the router, state and bootstrap for the `bpd` binary and for
//! integration tests.

pub mod api_types;
pub mod bootstrap;
pub mod routes;
pub mod state;
