//! Drivers that exercise the allocation engine: an interactive command
//! session and a multi-threaded randomized simulation.

pub mod interactive;
pub mod simulated;
