//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{BankerError, Result};

/// Full banker configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// Knobs for the simulated multi-worker mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Request/release rounds per worker.
    pub rounds: u32,
    /// Upper bound (inclusive) of each random per-resource draw.
    pub max_draw: u32,
    /// Pause after each request and each release.
    pub pause_ms: u64,
    /// Base RNG seed; worker `pid` uses `seed + pid`. `None` draws one.
    pub seed: Option<u64>,
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSONL activity log. `None` disables the file log.
    pub jsonl_path: Option<PathBuf>,
    pub jsonl_fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub channel_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            max_draw: 3,
            pause_ms: 100,
            seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_path: None,
            jsonl_fallback_path: None,
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
            channel_capacity: 1024,
        }
    }
}

impl Config {
    /// Default configuration path (current directory).
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("banker.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_var)
    }

    fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| BankerError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let mut parsed: Self = toml::from_str(&raw)?;
            parsed.config_file = Some(path_buf);
            parsed
        } else if is_explicit_path {
            return Err(BankerError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the session-start event.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("BANKER_SIM_ROUNDS") {
            self.simulation.rounds = parse_env("BANKER_SIM_ROUNDS", &raw)?;
        }
        if let Some(raw) = lookup("BANKER_SIM_MAX_DRAW") {
            self.simulation.max_draw = parse_env("BANKER_SIM_MAX_DRAW", &raw)?;
        }
        if let Some(raw) = lookup("BANKER_SIM_PAUSE_MS") {
            self.simulation.pause_ms = parse_env("BANKER_SIM_PAUSE_MS", &raw)?;
        }
        if let Some(raw) = lookup("BANKER_SIM_SEED") {
            self.simulation.seed = Some(parse_env("BANKER_SIM_SEED", &raw)?);
        }
        if let Some(raw) = lookup("BANKER_LOG_JSONL") {
            self.logging.jsonl_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("BANKER_LOG_CHANNEL_CAPACITY") {
            self.logging.channel_capacity = parse_env("BANKER_LOG_CHANNEL_CAPACITY", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.simulation.rounds == 0 {
            return Err(BankerError::InvalidConfig {
                details: "simulation.rounds must be >= 1".to_string(),
            });
        }
        if self.logging.channel_capacity == 0 {
            return Err(BankerError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }
        if self.logging.max_size_bytes < 1024 {
            return Err(BankerError::InvalidConfig {
                details: format!(
                    "logging.max_size_bytes must be >= 1024, got {}",
                    self.logging.max_size_bytes
                ),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(BankerError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| BankerError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
