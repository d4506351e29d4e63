//! Interactive command session.
//!
//! Grammar (one command per line, case-insensitive keywords):
//!
//! ```text
//! request <amount> res <resource> pid <process>
//! release <amount> res <resource> pid <process>
//! status | safe | help | end
//! ```
//!
//! Text never reaches the coordinator: each line is parsed into a typed
//! [`Command`] and requests/releases become one-hot amount vectors. The
//! session is parameterized over I/O for testability.

#![allow(missing_docs)]

use std::io::{self, BufRead, Write};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::engine::coordinator::{AllocationCoordinator, Decision, Outcome};

static OPERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(request|release)\s+(\d+)\s+res\s+(\d+)\s+pid\s+(\d+)$")
        .expect("operation grammar is a valid regex")
});

/// A parsed session command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Request {
        amount: u32,
        resource: usize,
        pid: usize,
    },
    Release {
        amount: u32,
        resource: usize,
        pid: usize,
    },
    Status,
    Safe,
    Help,
    End,
}

/// Why a line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unrecognized command {line:?} (try `help`)")]
    Unrecognized { line: String },
    #[error("number out of range in {field}: {value}")]
    NumberOutOfRange { field: &'static str, value: String },
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line.to_ascii_lowercase().as_str() {
        "end" | "quit" | "exit" => return Ok(Some(Command::End)),
        "status" => return Ok(Some(Command::Status)),
        "safe" => return Ok(Some(Command::Safe)),
        "help" | "?" => return Ok(Some(Command::Help)),
        _ => {}
    }

    let caps = OPERATION
        .captures(line)
        .ok_or_else(|| CommandError::Unrecognized {
            line: line.to_string(),
        })?;

    let amount = parse_field::<u32>("amount", &caps[2])?;
    let resource = parse_field::<usize>("res", &caps[3])?;
    let pid = parse_field::<usize>("pid", &caps[4])?;

    if caps[1].eq_ignore_ascii_case("request") {
        Ok(Some(Command::Request {
            amount,
            resource,
            pid,
        }))
    } else {
        Ok(Some(Command::Release {
            amount,
            resource,
            pid,
        }))
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| CommandError::NumberOutOfRange {
        field,
        value: raw.to_string(),
    })
}

/// Vector of `len` zeros with `amount` at `index`, or `None` if out of range.
pub fn one_hot(len: usize, index: usize, amount: u32) -> Option<Vec<u32>> {
    (index < len).then(|| {
        let mut v = vec![0; len];
        v[index] = amount;
        v
    })
}

/// Counters for a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub commands: u64,
    pub granted: u64,
    pub released: u64,
    pub denied: u64,
    pub rejected_lines: u64,
}

impl SessionSummary {
    fn record(&mut self, decision: &Decision) {
        match decision {
            Ok(Outcome::Granted) => self.granted += 1,
            Ok(Outcome::Released) => self.released += 1,
            Err(_) => self.denied += 1,
        }
    }
}

/// Options for [`run_session`].
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Print `Enter command: ` before each line.
    pub prompt: bool,
    /// Write errors and `status`/`safe`/`help` output as JSON lines.
    pub json: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prompt: true,
            json: false,
        }
    }
}

/// Run commands from `reader` until `end` or end of input.
///
/// Allocation outcomes are reported by the coordinator's observers; this
/// loop writes prompts, parse errors, and `status`/`safe`/`help` output.
pub fn run_session<R: BufRead, W: Write>(
    coordinator: &AllocationCoordinator,
    reader: &mut R,
    writer: &mut W,
    options: SessionOptions,
) -> io::Result<SessionSummary> {
    let mut summary = SessionSummary::default();
    let mut line = String::new();

    loop {
        if options.prompt {
            write!(writer, "Enter command: ")?;
            writer.flush()?;
        }

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                summary.rejected_lines += 1;
                write_error(writer, options.json, &e.to_string())?;
                continue;
            }
        };
        summary.commands += 1;

        match command {
            Command::End => break,
            Command::Help if options.json => {
                writeln!(writer, "{}", json!({ "help": HELP_LINES }))?;
            }
            Command::Help => write_help(writer)?,
            Command::Status if options.json => {
                writeln!(writer, "{}", json!({ "status": coordinator.snapshot() }))?;
            }
            Command::Status => write_status(coordinator, writer)?,
            Command::Safe => {
                let sequence = coordinator.safe_sequence();
                match (options.json, sequence) {
                    (true, sequence) => writeln!(
                        writer,
                        "{}",
                        json!({ "safe": sequence.is_some(), "sequence": sequence })
                    )?,
                    (false, Some(seq)) => writeln!(writer, "safe sequence: {seq:?}")?,
                    (false, None) => writeln!(writer, "state is NOT safe")?,
                }
            }
            Command::Request {
                amount,
                resource,
                pid,
            }
            | Command::Release {
                amount,
                resource,
                pid,
            } => {
                let Some(amounts) = one_hot(coordinator.num_resources(), resource, amount) else {
                    summary.rejected_lines += 1;
                    let message = format!(
                        "resource index {resource} out of range (system has {})",
                        coordinator.num_resources()
                    );
                    write_error(writer, options.json, &message)?;
                    continue;
                };
                let decision = if matches!(command, Command::Request { .. }) {
                    coordinator.request(pid, &amounts)
                } else {
                    coordinator.release(pid, &amounts)
                };
                summary.record(&decision);
            }
        }
    }

    Ok(summary)
}

const HELP_LINES: [&str; 5] = [
    "request <amount> res <resource> pid <process>",
    "release <amount> res <resource> pid <process>",
    "status   show available, allocation and need",
    "safe     show a safe completion sequence",
    "end      leave the session",
];

fn write_help<W: Write>(writer: &mut W) -> io::Result<()> {
    writeln!(writer, "commands:")?;
    for line in HELP_LINES {
        writeln!(writer, "  {line}")?;
    }
    Ok(())
}

fn write_error<W: Write>(writer: &mut W, json: bool, message: &str) -> io::Result<()> {
    if json {
        writeln!(writer, "{}", json!({ "error": message }))
    } else {
        writeln!(writer, "error: {message}")
    }
}

fn write_status<W: Write>(coordinator: &AllocationCoordinator, writer: &mut W) -> io::Result<()> {
    let snap = coordinator.snapshot();
    writeln!(writer, "available: {:?}", snap.available)?;
    writeln!(writer, "{:>5}  {:<16}  need", "pid", "allocation")?;
    for (pid, (alloc, need)) in snap.allocation.iter().zip(&snap.need).enumerate() {
        writeln!(writer, "{pid:>5}  {:<16}  {need:?}", format!("{alloc:?}"))?;
    }
    Ok(())
}
