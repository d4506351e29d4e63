//! Banker's-algorithm allocation engine: resource state, safety check, and
//! the coordinator that serializes requests and releases.

pub mod coordinator;
pub mod safety;
pub mod state;
