//! BNK-prefixed error types with structured error codes.
//!
//! Two families:
//! - [`BankerError`]: setup, configuration and driver failures (abort startup).
//! - [`AllocationError`]: per-call denials from the allocation coordinator
//!   (locally recoverable, never fatal).

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, BankerError>;

/// Top-level error type for setup, configuration and driver failures.
#[derive(Debug, Error)]
pub enum BankerError {
    #[error("[BNK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BNK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[BNK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BNK-1101] setup parse failure at token {position} ({context}): {details}")]
    SetupParse {
        position: usize,
        context: String,
        details: String,
    },

    #[error("[BNK-1102] invalid setup: {details}")]
    InvalidSetup { details: String },

    #[error("[BNK-1201] initial state is not safe: no process can finish among {stuck:?}")]
    UnsafeInitialState { stuck: Vec<usize> },

    #[error("[BNK-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BNK-3002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[BNK-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[BNK-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl BankerError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "BNK-1001",
            Self::MissingConfig { .. } => "BNK-1002",
            Self::ConfigParse { .. } => "BNK-1003",
            Self::SetupParse { .. } => "BNK-1101",
            Self::InvalidSetup { .. } => "BNK-1102",
            Self::UnsafeInitialState { .. } => "BNK-1201",
            Self::Io { .. } => "BNK-3001",
            Self::Serialization { .. } => "BNK-3002",
            Self::ChannelClosed { .. } => "BNK-3003",
            Self::Runtime { .. } => "BNK-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BankerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for BankerError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

// ──────────────────── allocation denials ────────────────────

/// Which bound a request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestViolation {
    /// Amount exceeds the process's remaining declared need.
    ExceedsNeed,
    /// Amount exceeds the currently free instances.
    ExceedsAvailable,
}

impl std::fmt::Display for RequestViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExceedsNeed => f.write_str("exceeds declared need"),
            Self::ExceedsAvailable => f.write_str("exceeds available"),
        }
    }
}

/// A denied request or release. The coordinator guarantees no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("[BNK-2001] invalid request by process {pid} on resource {resource}: {reason}")]
    InvalidRequest {
        pid: usize,
        resource: usize,
        reason: RequestViolation,
    },

    #[error("[BNK-2002] unknown process {pid} (system has {processes})")]
    UnknownProcess { pid: usize, processes: usize },

    #[error("[BNK-2003] amount vector has {got} entries, expected {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("[BNK-2101] request by process {pid} denied: would leave the system unsafe")]
    UnsafeState { pid: usize },

    #[error(
        "[BNK-2201] invalid release by process {pid} on resource {resource}: releasing {requested}, holding {held}"
    )]
    InvalidRelease {
        pid: usize,
        resource: usize,
        requested: u32,
        held: u32,
    },
}

impl AllocationError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "BNK-2001",
            Self::UnknownProcess { .. } => "BNK-2002",
            Self::ShapeMismatch { .. } => "BNK-2003",
            Self::UnsafeState { .. } => "BNK-2101",
            Self::InvalidRelease { .. } => "BNK-2201",
        }
    }

    /// Short snake_case label for event records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::UnknownProcess { .. } => "unknown_process",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::UnsafeState { .. } => "unsafe_state",
            Self::InvalidRelease { .. } => "invalid_release",
        }
    }
}
