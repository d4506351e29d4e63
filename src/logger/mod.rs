//! Activity reporting: synchronous console lines plus a JSONL audit log
//! written by a dedicated logger thread.

pub mod activity;
#[cfg(feature = "cli")]
pub mod console;
pub mod jsonl;
