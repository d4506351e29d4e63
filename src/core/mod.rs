//! Core types: errors, configuration, setup loading.

pub mod config;
pub mod errors;
pub mod setup;
