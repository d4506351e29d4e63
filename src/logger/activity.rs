//! Activity logger: a dedicated thread owns the `JsonlWriter`.
//!
//! The coordinator emits events while holding its guard, so the handle never
//! blocks: `try_send()` on a bounded crossbeam channel, counting drops when
//! the logger falls behind. Channel FIFO order preserves commit order.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{BankerError, Result};
use crate::engine::coordinator::{AllocationEvent, AllocationObserver, OperationKind};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Events accepted by the logger thread.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SessionStarted {
        mode: String,
        processes: usize,
        resources: usize,
        config_hash: String,
    },
    SessionStopped {
        reason: String,
        operations: u64,
    },
    Allocation(AllocationEvent),
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    /// Drops not yet reported in the log; drained by the logger thread.
    pending_drops: Arc<AtomicU64>,
    /// Drops since the logger was spawned.
    total_drops: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking; drops when full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.pending_drops.fetch_add(1, Ordering::Relaxed);
            self.total_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of events dropped due to channel back-pressure since spawn.
    pub fn dropped_events(&self) -> u64 {
        self.total_drops.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

impl AllocationObserver for ActivityLoggerHandle {
    fn on_event(&self, event: &AllocationEvent) {
        self.send(ActivityEvent::Allocation(event.clone()));
    }
}

/// Options for the logger thread.
#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    /// Build from the `[logging]` section; `None` when no JSONL path is set.
    pub fn from_logging(logging: &LoggingConfig) -> Option<Self> {
        let path = logging.jsonl_path.clone()?;
        Some(Self {
            jsonl: JsonlConfig {
                path,
                fallback_path: logging.jsonl_fallback_path.clone(),
                max_size_bytes: logging.max_size_bytes,
                max_rotated_files: logging.max_rotated_files,
            },
            channel_capacity: logging.channel_capacity,
        })
    }
}

/// Spawn the logger thread and return a handle.
///
/// The thread runs until `handle.shutdown()` is called or all senders drop.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let pending = Arc::new(AtomicU64::new(0));
    let pending_clone = Arc::clone(&pending);

    let handle = ActivityLoggerHandle {
        tx,
        pending_drops: pending,
        total_drops: Arc::new(AtomicU64::new(0)),
    };

    let join = thread::Builder::new()
        .name("banker-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl, &pending_clone))
        .map_err(|e| BankerError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, pending: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = pending.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.sync();
}

/// Map an activity event to its JSONL record.
pub fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            mode,
            processes,
            resources,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!(
                "mode={mode} processes={processes} resources={resources} config_hash={config_hash}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SessionStopped { reason, operations } => {
            let mut e = LogEntry::new(EventType::SessionStop, Severity::Info);
            e.details = Some(format!("reason={reason} operations={operations}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::Allocation(alloc) => {
            let event_type = match alloc.kind {
                OperationKind::Request => EventType::Request,
                OperationKind::Release => EventType::Release,
            };
            let severity = if alloc.decision.is_ok() {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(event_type, severity);
            e.seq = Some(alloc.seq);
            e.pid = Some(alloc.pid);
            e.amounts = Some(alloc.amounts.clone());
            e.outcome = Some(alloc.outcome_label().to_string());
            e.ok = Some(alloc.decision.is_ok());
            if let Err(err) = &alloc.decision {
                e.error_code = Some(err.code().to_string());
                e.error_message = Some(err.to_string());
            }
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SessionStop, Severity::Info),
    }
}
