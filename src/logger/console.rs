//! Console reporter: one line per coordinator call, written synchronously
//! while the coordinator's guard is held so lines appear in commit order.

#![allow(missing_docs)]

use std::io::{self, Write};

use colored::Colorize;
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::AllocationError;
use crate::engine::coordinator::{AllocationEvent, AllocationObserver, OperationKind};

/// Output flavor for the console reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStyle {
    /// Human-readable lines, optionally colored.
    Text { color: bool },
    /// One JSON object per line.
    Json,
}

/// Observer that prints allocation events to a writer (stdout by default).
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
    style: ConsoleStyle,
}

impl ConsoleReporter {
    pub fn stdout(style: ConsoleStyle) -> Self {
        Self::with_writer(Box::new(io::stdout()), style)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, style: ConsoleStyle) -> Self {
        Self {
            out: Mutex::new(out),
            style,
        }
    }
}

impl AllocationObserver for ConsoleReporter {
    fn on_event(&self, event: &AllocationEvent) {
        let line = match self.style {
            ConsoleStyle::Text { color } => format_text(event, color),
            ConsoleStyle::Json => format_json(event),
        };
        let mut out = self.out.lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// `Process 1 requests [1, 0, 2]: granted`
pub fn format_text(event: &AllocationEvent, color: bool) -> String {
    let verb = match event.kind {
        OperationKind::Request => "requests",
        OperationKind::Release => "releases",
    };
    let verdict = match &event.decision {
        Ok(_) => event.outcome_label().to_string(),
        Err(err) => format!("denied ({})", denial_reason(err)),
    };
    let verdict = if !color {
        verdict
    } else if event.decision.is_ok() {
        verdict.green().to_string()
    } else if matches!(event.decision, Err(AllocationError::UnsafeState { .. })) {
        verdict.red().bold().to_string()
    } else {
        verdict.yellow().to_string()
    };
    format!(
        "Process {} {verb} {:?}: {verdict}",
        event.pid, event.amounts
    )
}

fn denial_reason(err: &AllocationError) -> String {
    match err {
        AllocationError::InvalidRequest {
            resource, reason, ..
        } => format!("invalid request: {reason} on resource {resource}"),
        AllocationError::UnknownProcess { processes, .. } => {
            format!("unknown process, system has {processes}")
        }
        AllocationError::ShapeMismatch { expected, got } => {
            format!("expected {expected} amounts, got {got}")
        }
        AllocationError::UnsafeState { .. } => "unsafe state".to_string(),
        AllocationError::InvalidRelease {
            resource, held, ..
        } => format!("invalid release: holds {held} of resource {resource}"),
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    seq: u64,
    pid: usize,
    kind: OperationKind,
    amounts: &'a [u32],
    outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'a str>,
}

fn format_json(event: &AllocationEvent) -> String {
    let line = JsonLine {
        seq: event.seq,
        pid: event.pid,
        kind: event.kind,
        amounts: &event.amounts,
        outcome: event.outcome_label(),
        error_code: event.decision.as_ref().err().map(AllocationError::code),
    };
    serde_json::to_string(&line).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}
