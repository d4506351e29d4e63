//! Top-level CLI definition and dispatch.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::json;
use thiserror::Error;

use banker_sim::core::config::Config;
use banker_sim::core::errors::BankerError;
use banker_sim::core::setup::load_state;
use banker_sim::driver::interactive::{SessionOptions, SessionSummary, run_session};
use banker_sim::driver::simulated::{SimulationReport, run_simulation};
use banker_sim::engine::coordinator::{AllocationCoordinator, AllocationObserver};
use banker_sim::engine::safety::SafetyReport;
use banker_sim::engine::state::ResourceState;
use banker_sim::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use banker_sim::logger::console::{ConsoleReporter, ConsoleStyle};

/// Banker's-algorithm resource allocation simulator.
#[derive(Debug, Parser)]
#[command(
    name = "banker",
    author,
    version,
    about = "Deadlock-avoidance resource allocation simulator (Banker's algorithm)",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Type request/release commands interactively.
    Manual(SetupArgs),
    /// Run one randomized worker thread per process.
    Auto(AutoArgs),
    /// Load a setup file and report whether it is safe.
    Check(SetupArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct SetupArgs {
    /// Setup file describing available, max and allocation.
    #[arg(value_name = "SETUP")]
    setup: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct AutoArgs {
    #[command(flatten)]
    setup: SetupArgs,
    /// Request/release rounds per worker.
    #[arg(long, value_name = "N")]
    rounds: Option<u32>,
    /// Base RNG seed (worker pid uses seed + pid).
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Pause after each request and release.
    #[arg(long, value_name = "MS")]
    pause_ms: Option<u64>,
    /// Upper bound of each random per-resource draw.
    #[arg(long, value_name = "N")]
    max_draw: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// Top-level CLI error.
#[derive(Debug, Error)]
pub enum CliError {
    /// Setup, config or engine failure.
    #[error("{0}")]
    Banker(#[from] BankerError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Banker(_) => 1,
            Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Manual(args) => run_manual(cli, args),
        Command::Auto(args) => run_auto(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── commands ────────────────────

fn run_check(cli: &Cli, args: &SetupArgs) -> Result<(), CliError> {
    let state = load_state(&args.setup)?;
    let coordinator = AllocationCoordinator::new(state);
    let report = coordinator.safety_report();

    if cli.json {
        let payload = json!({
            "setup": args.setup,
            "processes": coordinator.num_processes(),
            "resources": coordinator.num_resources(),
            "safety": report,
        });
        writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&payload)?)?;
    } else if !cli.quiet {
        let mut out = io::stdout();
        write_state_summary(&mut out, &coordinator.state())?;
        write_safety(&mut out, &report, color_enabled(cli))?;
    }

    ensure_safe(&report)?;
    Ok(())
}

fn run_manual(cli: &Cli, args: &SetupArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let session = Session::start(cli, &config, &args.setup, "manual")?;

    let stdin = io::stdin();
    let prompt = !cli.json && stdin.is_terminal();
    let options = SessionOptions {
        prompt,
        json: cli.json,
    };
    let summary = drive_session(session, &mut stdin.lock(), &mut io::stdout(), options)?;

    if cli.json {
        writeln!(
            io::stdout(),
            "{}",
            serde_json::to_string(&json!({ "summary": summary }))?
        )?;
    } else if cli.verbose {
        writeln!(
            io::stdout(),
            "session: {} commands, {} granted, {} released, {} denied, {} rejected",
            summary.commands,
            summary.granted,
            summary.released,
            summary.denied,
            summary.rejected_lines
        )?;
    }
    Ok(())
}

/// Run the interactive loop, then close the session whether or not it failed.
fn drive_session<R: BufRead, W: Write>(
    session: Session,
    reader: &mut R,
    writer: &mut W,
    options: SessionOptions,
) -> Result<SessionSummary, CliError> {
    let result = run_session(&session.coordinator, reader, writer, options);
    match &result {
        Ok(summary) => session.finish(
            "end of session",
            summary.granted + summary.released + summary.denied,
        ),
        Err(e) => {
            if let Some(logger) = &session.logger {
                logger.send(ActivityEvent::Error {
                    code: "BNK-3001".to_string(),
                    message: format!("session I/O failure: {e}"),
                });
            }
            session.finish("session I/O failure", 0);
        }
    }
    Ok(result?)
}

fn run_auto(cli: &Cli, args: &AutoArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(rounds) = args.rounds {
        config.simulation.rounds = rounds;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(pause_ms) = args.pause_ms {
        config.simulation.pause_ms = pause_ms;
    }
    if let Some(max_draw) = args.max_draw {
        config.simulation.max_draw = max_draw;
    }

    let session = Session::start(cli, &config, &args.setup.setup, "auto")?;
    let result = run_simulation(&session.coordinator, &config.simulation);

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(logger) = &session.logger {
                logger.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
            session.finish("worker failure", 0);
            return Err(e.into());
        }
    };

    if cli.json {
        writeln!(io::stdout(), "{}", serde_json::to_string(&report)?)?;
    } else if !cli.quiet {
        write_simulation_summary(&mut io::stdout(), &report, cli.verbose)?;
    }

    session.finish("simulation complete", report.total_operations());
    Ok(())
}

// ──────────────────── session plumbing ────────────────────

/// Coordinator plus the reporting stack wired around it.
struct Session {
    coordinator: AllocationCoordinator,
    logger: Option<ActivityLoggerHandle>,
    logger_join: Option<JoinHandle<()>>,
}

impl Session {
    /// Load the setup, veto unsafe initial states, attach observers.
    fn start(cli: &Cli, config: &Config, setup: &Path, mode: &str) -> Result<Self, CliError> {
        let state = load_state(setup)?;
        let processes = state.num_processes();
        let resources = state.num_resources();

        let mut coordinator = AllocationCoordinator::new(state);
        let initial = coordinator.safety_report();
        ensure_safe(&initial)?;

        if cli.verbose && !cli.json {
            write_safety(&mut io::stdout(), &initial, color_enabled(cli))?;
        }

        if !cli.quiet {
            let style = if cli.json {
                ConsoleStyle::Json
            } else {
                ConsoleStyle::Text {
                    color: color_enabled(cli),
                }
            };
            coordinator = coordinator
                .with_observer(Arc::new(ConsoleReporter::stdout(style)) as Arc<dyn AllocationObserver>);
        }

        let (logger, logger_join) = match ActivityLoggerConfig::from_logging(&config.logging) {
            Some(logger_config) => {
                let (handle, join) = spawn_logger(logger_config)?;
                handle.send(ActivityEvent::SessionStarted {
                    mode: mode.to_string(),
                    processes,
                    resources,
                    config_hash: config.stable_hash().unwrap_or_default(),
                });
                coordinator = coordinator
                    .with_observer(Arc::new(handle.clone()) as Arc<dyn AllocationObserver>);
                (Some(handle), Some(join))
            }
            None => (None, None),
        };

        Ok(Self {
            coordinator,
            logger,
            logger_join,
        })
    }

    /// Log the stop event and wait for the logger thread to drain.
    fn finish(self, reason: &str, operations: u64) {
        let Some(logger) = self.logger else {
            return;
        };
        logger.send(ActivityEvent::SessionStopped {
            reason: reason.to_string(),
            operations,
        });
        let dropped = logger.dropped_events();
        if dropped > 0 {
            eprintln!("[BNK-LOG] {dropped} activity events dropped due to back-pressure");
        }
        logger.shutdown();
        if let Some(join) = self.logger_join
            && join.join().is_err()
        {
            eprintln!("[BNK-LOG] logger thread panicked");
        }
    }
}

fn ensure_safe(report: &SafetyReport) -> Result<(), BankerError> {
    if report.safe {
        Ok(())
    } else {
        Err(BankerError::UnsafeInitialState {
            stuck: report.stuck.clone(),
        })
    }
}

fn color_enabled(cli: &Cli) -> bool {
    !cli.no_color && io::stdout().is_terminal()
}

// ──────────────────── rendering ────────────────────

fn write_state_summary<W: Write>(out: &mut W, state: &ResourceState) -> io::Result<()> {
    writeln!(
        out,
        "{} processes, {} resource types",
        state.num_processes(),
        state.num_resources()
    )?;
    writeln!(out, "available: {:?}", state.available())?;
    writeln!(out, "totals:    {:?}", state.totals())?;
    writeln!(out, "{:>5}  {:<16}  {:<16}  need", "pid", "max", "allocation")?;
    for pid in 0..state.num_processes() {
        writeln!(
            out,
            "{pid:>5}  {:<16}  {:<16}  {:?}",
            format!("{:?}", state.max()[pid]),
            format!("{:?}", state.allocation()[pid]),
            state.need()[pid]
        )?;
    }
    Ok(())
}

fn write_safety<W: Write>(out: &mut W, report: &SafetyReport, color: bool) -> io::Result<()> {
    let (verdict, detail) = if report.safe {
        ("SAFE", format!("safe sequence: {:?}", report.finish_order))
    } else {
        ("UNSAFE", format!("processes that cannot finish: {:?}", report.stuck))
    };
    let verdict = match (color, report.safe) {
        (false, _) => verdict.to_string(),
        (true, true) => verdict.green().bold().to_string(),
        (true, false) => verdict.red().bold().to_string(),
    };
    writeln!(out, "state: {verdict} ({detail})")
}

fn write_simulation_summary<W: Write>(
    out: &mut W,
    report: &SimulationReport,
    verbose: bool,
) -> io::Result<()> {
    writeln!(
        out,
        "simulation finished: {} granted, {} released, {} denied (seed {})",
        report.total_granted(),
        report.total_released(),
        report.total_denied(),
        report.base_seed
    )?;
    if verbose {
        for w in &report.workers {
            writeln!(
                out,
                "  process {}: granted={} denied_invalid={} denied_unsafe={} released={}",
                w.pid, w.granted, w.denied_invalid, w.denied_unsafe, w.released
            )?;
        }
    }
    writeln!(
        out,
        "final state: {}",
        if report.final_safe { "safe" } else { "UNSAFE" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_auto_overrides() {
        let cli = Cli::try_parse_from([
            "banker", "auto", "setup.txt", "--rounds", "5", "--seed", "11", "--pause-ms", "0",
        ])
        .expect("valid args");
        match cli.command {
            Command::Auto(args) => {
                assert_eq!(args.setup.setup, PathBuf::from("setup.txt"));
                assert_eq!(args.rounds, Some(5));
                assert_eq!(args.seed, Some(11));
                assert_eq!(args.pause_ms, Some(0));
                assert_eq!(args.max_draw, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_session(log_path: &Path) -> Session {
        let state = ResourceState::initialize(vec![3], vec![vec![2]], vec![vec![1]])
            .expect("valid state");
        let logging = banker_sim::core::config::LoggingConfig {
            jsonl_path: Some(log_path.to_path_buf()),
            ..Default::default()
        };
        let logger_config = ActivityLoggerConfig::from_logging(&logging).expect("path configured");
        let (handle, join) = spawn_logger(logger_config).expect("spawn logger");
        Session {
            coordinator: AllocationCoordinator::new(state)
                .with_observer(Arc::new(handle.clone()) as Arc<dyn AllocationObserver>),
            logger: Some(handle),
            logger_join: Some(join),
        }
    }

    #[test]
    fn session_io_failure_still_closes_activity_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("activity.jsonl");
        let session = logged_session(&log_path);

        let mut reader = io::Cursor::new("request 1 res 0 pid 0\nstatus\nend\n");
        let err = drive_session(
            session,
            &mut reader,
            &mut BrokenPipe,
            SessionOptions {
                prompt: false,
                json: false,
            },
        )
        .expect_err("write failure must surface");
        assert_eq!(err.exit_code(), 2);

        let raw = std::fs::read_to_string(&log_path).expect("log flushed on failure");
        let events: Vec<String> = raw
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).expect("jsonl line");
                v["event"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(events, vec!["request", "error", "session_stop"], "{raw}");
    }

    #[test]
    fn finished_session_logs_stop_with_operation_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("activity.jsonl");
        let session = logged_session(&log_path);

        let mut reader = io::Cursor::new("request 1 res 0 pid 0\nrelease 1 res 0 pid 0\n");
        let summary = drive_session(
            session,
            &mut reader,
            &mut io::sink(),
            SessionOptions {
                prompt: false,
                json: false,
            },
        )
        .expect("session runs");
        assert_eq!(summary.granted, 1);
        assert_eq!(summary.released, 1);

        let raw = std::fs::read_to_string(&log_path).expect("log written");
        assert!(raw.contains("operations=2"), "{raw}");
    }

    #[test]
    fn unsafe_report_maps_to_startup_error() {
        let report = SafetyReport {
            safe: false,
            finish_order: vec![0],
            stuck: vec![1, 2],
            passes: 2,
        };
        let err = ensure_safe(&report).expect_err("unsafe must veto startup");
        assert_eq!(err.code(), "BNK-1201");
        assert_eq!(CliError::from(err).exit_code(), 1);
    }
}
