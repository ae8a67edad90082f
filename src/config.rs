use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown flag: -{0}")]
    UnknownFlag(String),

    #[error("flag needs an argument: -{0}")]
    MissingValue(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("invalid value {value:?} for flag -{flag}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },

    #[error("value {value} for '{field}' is out of range (min: {min}, max: {max})")]
    OutOfRange {
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid_value(flag: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            flag: flag.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn out_of_range(field: &str, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        }
    }
}

// =============================================================================
// Run configuration
// =============================================================================

/// Settings for one stress run: N workers plus one monitor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Number of worker participants.
    pub nodes: usize,
    /// Acquire/release cycles performed by the monitor before shutdown.
    pub iters: usize,
    /// Print a trace line at every phase transition of the lock.
    pub debug: bool,
    /// Suppress the per-cycle "entering/done critical section" lines.
    pub quiet: bool,
    /// Sleep between failed wait checks. Zero falls back to `yield_now`.
    pub yield_us: u64,
    /// Worker that holds the lock for `slow_hold_ms` on every cycle.
    pub slow_worker: Option<usize>,
    pub slow_hold_ms: u64,
    /// Upper bound of a random extra hold inside every critical section.
    pub jitter_us: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            iters: 100_000,
            debug: false,
            quiet: false,
            yield_us: 10_000,
            slow_worker: None,
            slow_hold_ms: 50,
            jitter_us: 0,
        }
    }
}

impl RunConfig {
    pub fn participants(&self) -> usize {
        self.nodes + 1
    }

    /// Index of the monitor, one past the last worker.
    pub fn monitor_id(&self) -> usize {
        self.nodes
    }

    pub fn yield_interval(&self) -> Duration {
        Duration::from_micros(self.yield_us)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_micros(self.jitter_us)
    }

    /// Extra time worker `id` holds the lock on each cycle.
    pub fn hold_for(&self, id: usize) -> Duration {
        match self.slow_worker {
            Some(slow) if slow == id => Duration::from_millis(self.slow_hold_ms),
            _ => Duration::ZERO,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::out_of_range("nodes", 0, 1, u64::MAX));
        }
        if self.iters == 0 {
            return Err(ConfigError::out_of_range("iters", 0, 1, u64::MAX));
        }
        if let Some(slow) = self.slow_worker {
            if slow >= self.nodes {
                return Err(ConfigError::out_of_range(
                    "slow_worker",
                    slow as u64,
                    0,
                    self.nodes as u64 - 1,
                ));
            }
        }
        Ok(())
    }

    fn apply(&mut self, flag: &str, value: &str) -> Result<(), ConfigError> {
        match flag {
            "nodes" => self.nodes = parse_number(flag, value)?,
            "iters" => self.iters = parse_number(flag, value)?,
            "yield-us" | "yield_us" => self.yield_us = parse_number(flag, value)?,
            "slow-worker" | "slow_worker" => self.slow_worker = Some(parse_number(flag, value)?),
            "slow-hold-ms" | "slow_hold_ms" => self.slow_hold_ms = parse_number(flag, value)?,
            "jitter-us" | "jitter_us" => self.jitter_us = parse_number(flag, value)?,
            "debug" => self.debug = parse_bool(flag, value)?,
            "quiet" => self.quiet = parse_bool(flag, value)?,
            _ => return Err(ConfigError::UnknownFlag(flag.to_string())),
        }
        Ok(())
    }
}

// =============================================================================
// Command line
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run(RunConfig),
    Help,
}

pub const USAGE: &str = "\
Usage: bakery [flags]

  -nodes N          number of participating worker nodes (default 5)
  -iters N          number of monitor iterations (default 100000)
  -debug            print debug trace
  -quiet            do not print per-cycle progress
  -yield-us N       microseconds to sleep between failed wait checks (default 10000)
  -slow-worker ID   worker that holds the lock longer on every cycle
  -slow-hold-ms N   hold time of the slow worker (default 50)
  -jitter-us N      random extra hold time inside the critical section (default 0)
  -config PATH      TOML file with any of the settings above
  -h, -help         show this message";

const BOOL_FLAGS: [&str; 2] = ["debug", "quiet"];

/// Parses Go-style flags (`-name value`, `-name=value`, `--name=value`).
/// Settings from `-config` are applied first so explicit flags override them.
pub fn parse_args<I>(args: I) -> Result<Invocation, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(stripped) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            return Err(ConfigError::UnexpectedArgument(arg.clone()));
        };

        let (name, inline) = match stripped.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (stripped.to_string(), None),
        };

        if name == "h" || name == "help" {
            return Ok(Invocation::Help);
        }

        let value = match inline {
            Some(value) => value,
            None if BOOL_FLAGS.contains(&name.as_str()) => "true".to_string(),
            None => args.next().ok_or_else(|| ConfigError::MissingValue(name.clone()))?,
        };

        if name == "config" {
            config_path = Some(PathBuf::from(value));
        } else {
            pairs.push((name, value));
        }
    }

    let mut config = match config_path {
        Some(path) => RunConfig::from_file(&path)?,
        None => RunConfig::default(),
    };
    for (name, value) in &pairs {
        config.apply(name, value)?;
    }
    config.validate()?;

    Ok(Invocation::Run(config))
}

fn parse_number<T>(flag: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err: T::Err| ConfigError::invalid_value(flag, value, err.to_string()))
}

fn parse_bool(flag: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "t" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::invalid_value(flag, value, "expected a boolean")),
    }
}
