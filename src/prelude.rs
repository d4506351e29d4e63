//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use banker_sim::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, LoggingConfig, SimulationConfig};
pub use crate::core::errors::{AllocationError, BankerError, RequestViolation, Result};
pub use crate::core::setup::{Setup, load_state};

// Engine
pub use crate::engine::coordinator::{
    AllocationCoordinator, AllocationEvent, AllocationObserver, Decision, OperationKind, Outcome,
    RecordingObserver,
};
pub use crate::engine::safety::{SafetyEngine, SafetyReport};
pub use crate::engine::state::{Direction, ResourceState, StateSnapshot};

// Drivers
pub use crate::driver::interactive::{Command, SessionOptions, SessionSummary, run_session};
pub use crate::driver::simulated::{SimulationReport, WorkerReport, run_simulation};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
