#![forbid(unsafe_code)]

//! Banker's-algorithm resource allocation simulator.
//!
//! A fixed set of processes shares a fixed set of reusable resource types.
//! Every request is granted only if the resulting state is *safe*, i.e. some
//! order exists in which every process can still obtain its declared maximum
//! and finish. Deadlock is therefore never entered.
//!
//! Layers:
//! 1. **Engine**: [`engine::state`] bookkeeping, [`engine::safety`] check,
//!    and the [`engine::coordinator`] that serializes request/release.
//! 2. **Drivers**: interactive command session and randomized multi-worker run.
//! 3. **Reporting**: console lines and a JSONL activity log.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use banker_sim::prelude::*;
//!
//! let state = load_state(std::path::Path::new("setup.txt"))?;
//! let coordinator = AllocationCoordinator::new(state);
//! assert!(coordinator.is_safe());
//! let decision = coordinator.request(1, &[1, 0, 2]);
//! # Ok::<(), BankerError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod driver;
pub mod engine;
pub mod logger;
