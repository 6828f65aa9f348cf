use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sweep::{SweepPlan, SweepPoint};

pub const DEFAULT_POINTS: u64 = 1024;
pub const DEFAULT_BLOCK_SIZE: u64 = 32;
pub const DEFAULT_STEP_SIZE: u64 = 1;
pub const DEFAULT_DEVICE: i32 = 0;

/// Maximum number of positional parameters after the program name.
pub const MAX_TOKENS: usize = 4;

const KILO: u64 = 1024;
const MEGA: u64 = 1024 * 1024;
const F64_BYTES: u64 = std::mem::size_of::<f64>() as u64;

/// Benchmark driver for compute-device workloads.
#[derive(Debug, Parser)]
#[command(name = "stepbench", version)]
#[command(about = "Validate workload parameters and dispatch a calculation run to a compute device")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run each sweep variant ITERATIONS times (plus two trimmed outliers) and print a timing table
    #[arg(long, value_name = "ITERATIONS", value_parser = clap::value_parser!(u32).range(1..))]
    pub sweep: Option<u32>,

    /// RNG seed for host data generation (random if omitted)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Log filter directive, e.g. `debug` or `stepbench=trace`
    #[arg(long, value_name = "DIRECTIVE")]
    pub log_level: Option<String>,

    /// [points] [block_size] [step_size] [device_number]; points accepts a k/K or m/M suffix
    #[arg(value_name = "ARGS", num_args = 1.., allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

/// Values substituted for positional parameters that were not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDefaults {
    pub point_count: u64,
    pub block_size: u64,
    pub step_size: u64,
    pub device_index: i32,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            point_count: DEFAULT_POINTS,
            block_size: DEFAULT_BLOCK_SIZE,
            step_size: DEFAULT_STEP_SIZE,
            device_index: DEFAULT_DEVICE,
        }
    }
}

/// Validated workload parameters. Only [`resolve`] and [`resolve_with`] hand these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunConfig {
    pub point_count: u64,
    pub block_size: u64,
    pub step_size: u64,
    pub device_index: i32,
}

impl RunConfig {
    /// Byte footprint of the workload's doubles.
    pub fn total_bytes(&self) -> u64 {
        // validation guarantees this does not overflow
        self.point_count * F64_BYTES
    }

    fn validate(self) -> Result<Self, UsageFailure> {
        if self.point_count == 0 {
            return Err(UsageFailure::ZeroPoints);
        }
        if self.point_count.checked_mul(F64_BYTES).is_none() {
            return Err(UsageFailure::PointsOverflow(self.point_count));
        }
        if self.block_size == 0 {
            return Err(UsageFailure::ZeroBlockSize);
        }
        if self.step_size == 0 {
            return Err(UsageFailure::ZeroStepSize);
        }
        if self.device_index < 0 {
            return Err(UsageFailure::NegativeDevice(self.device_index));
        }
        Ok(self)
    }
}

impl From<RunDefaults> for RunConfig {
    fn from(d: RunDefaults) -> Self {
        Self {
            point_count: d.point_count,
            block_size: d.block_size,
            step_size: d.step_size,
            device_index: d.device_index,
        }
    }
}

/// The arguments cannot describe a run; the caller should show the usage line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageFailure {
    #[error("expected at most 4 positional arguments, got {0}")]
    TooManyArguments(usize),
    #[error("point count must be greater than zero")]
    ZeroPoints,
    #[error("point count {0} has a byte footprint too large to represent")]
    PointsOverflow(u64),
    #[error("block size must be greater than zero")]
    ZeroBlockSize,
    #[error("step size must be greater than zero")]
    ZeroStepSize,
    #[error("device number must not be negative, got {0}")]
    NegativeDevice(i32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Usage(#[from] UsageFailure),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid sweep plan: {0}")]
    Plan(String),
}

pub fn usage_line(program: &str) -> String {
    format!(
        "Usage: {} <number of doubles> <block size> <step size> <device number>",
        program
    )
}

fn split_sign(token: &str) -> (bool, &str) {
    let trimmed = token.trim_start();
    if let Some(rest) = trimmed.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = trimmed.strip_prefix('+') {
        (false, rest)
    } else {
        (false, trimmed)
    }
}

/// Value of the leading run of ASCII digits, saturating on overflow.
fn leading_digits(s: &str) -> u64 {
    s.bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
        })
}

/// Leading-digit base-10 parse. Anything non-numeric, including a minus sign, gives 0.
pub fn parse_uint(token: &str) -> u64 {
    match split_sign(token) {
        (true, _) => 0,
        (false, digits) => leading_digits(digits),
    }
}

/// Leading-digit base-10 parse with an optional sign, clamped to `i32`.
pub fn parse_int(token: &str) -> i32 {
    let (negative, digits) = split_sign(token);
    let magnitude = i64::try_from(leading_digits(digits)).unwrap_or(i64::MAX);
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Point count shorthand: a trailing `k`/`K` scales by 1024, `m`/`M` by 1024².
///
/// Only the last character is inspected, so `"k"` alone is zero and `"4kb"` is 4.
pub fn parse_point_count(token: &str) -> u64 {
    let count = parse_uint(token);
    match token.chars().last() {
        Some('k' | 'K') => count.saturating_mul(KILO),
        Some('m' | 'M') => count.saturating_mul(MEGA),
        _ => count,
    }
}

/// Resolve positional tokens against the built-in defaults.
pub fn resolve<S: AsRef<str>>(tokens: &[S]) -> Result<RunConfig, UsageFailure> {
    resolve_with(RunDefaults::default(), tokens)
}

/// Resolve positional tokens; absent trailing tokens take their value from `defaults`.
pub fn resolve_with<S: AsRef<str>>(
    defaults: RunDefaults,
    tokens: &[S],
) -> Result<RunConfig, UsageFailure> {
    if tokens.len() > MAX_TOKENS {
        return Err(UsageFailure::TooManyArguments(tokens.len()));
    }

    let mut run = RunConfig::from(defaults);
    let mut tokens = tokens.iter().map(|t| t.as_ref());

    if let Some(t) = tokens.next() {
        run.point_count = parse_point_count(t);
    }
    if let Some(t) = tokens.next() {
        run.block_size = parse_uint(t);
    }
    if let Some(t) = tokens.next() {
        run.step_size = parse_uint(t);
    }
    if let Some(t) = tokens.next() {
        run.device_index = parse_int(t);
    }

    run.validate()
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub host: HostSection,

    #[serde(default)]
    pub sweep: SweepSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// A `[run]` value written either as a TOML integer or as a token string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RunValue {
    Number(i64),
    Token(String),
}

impl RunValue {
    fn point_count(&self) -> u64 {
        match self {
            RunValue::Number(n) => u64::try_from(*n).unwrap_or(0),
            RunValue::Token(t) => parse_point_count(t),
        }
    }

    fn uint(&self) -> u64 {
        match self {
            RunValue::Number(n) => u64::try_from(*n).unwrap_or(0),
            RunValue::Token(t) => parse_uint(t),
        }
    }

    fn int(&self) -> i32 {
        match self {
            RunValue::Number(n) => (*n).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            RunValue::Token(t) => parse_int(t),
        }
    }
}

/// Replacement defaults for the positional parameters.
///
/// Values follow the token rules, so a negative size becomes 0 and fails validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub points: Option<RunValue>,
    pub block_size: Option<RunValue>,
    pub step_size: Option<RunValue>,
    pub device: Option<RunValue>,
}

impl RunSection {
    pub fn overlay(&self, base: RunDefaults) -> RunDefaults {
        RunDefaults {
            point_count: self
                .points
                .as_ref()
                .map_or(base.point_count, RunValue::point_count),
            block_size: self.block_size.as_ref().map_or(base.block_size, RunValue::uint),
            step_size: self.step_size.as_ref().map_or(base.step_size, RunValue::uint),
            device_index: self.device.as_ref().map_or(base.device_index, RunValue::int),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostSection {
    pub seed: Option<u64>,
    pub memory_limit: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            seed: None,
            memory_limit: 4 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub points: Vec<String>,
    pub block_sizes: Vec<u64>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            points: ["32", "64", "1K", "1M", "16M"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            block_sizes: vec![32, 64, 128, 256],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Read the TOML file at `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str::<FileConfig>(&contents)?)
    }
}

/// Log filter directive: CLI flag first, then the file. `None` defers to the environment.
pub fn log_directive<'a>(cli: &'a Cli, file_cfg: &'a FileConfig) -> Option<&'a str> {
    cli.log_level
        .as_deref()
        .or(file_cfg.logging.level.as_deref())
}

/// Resolved configuration after merging TOML file + CLI overrides.
#[derive(Debug)]
pub struct AppConfig {
    pub run: RunConfig,
    pub seed: u64,
    pub memory_limit: u64,
    pub sweep_iterations: Option<u32>,
    pub sweep_plan: SweepPlan,
}

impl AppConfig {
    /// Build the final config: built-in defaults -> file values -> CLI tokens and flags.
    pub fn resolve(cli: &Cli, file_cfg: FileConfig) -> Result<Self, ConfigError> {
        let run = resolve_with(file_cfg.run.overlay(RunDefaults::default()), &cli.tokens)?;

        let seed = cli
            .seed
            .or(file_cfg.host.seed)
            .unwrap_or_else(rand::random);

        let sweep_plan = build_sweep_plan(&file_cfg.sweep)?;

        Ok(Self {
            run,
            seed,
            memory_limit: file_cfg.host.memory_limit,
            sweep_iterations: cli.sweep,
            sweep_plan,
        })
    }
}

fn build_sweep_plan(section: &SweepSection) -> Result<SweepPlan, ConfigError> {
    if section.points.is_empty() || section.block_sizes.is_empty() {
        return Err(ConfigError::Plan(
            "points and block_sizes must both be non-empty".to_string(),
        ));
    }

    let mut points = Vec::with_capacity(section.points.len());
    for label in &section.points {
        let count = parse_point_count(label);
        if count == 0 || count.checked_mul(F64_BYTES).is_none() {
            return Err(ConfigError::Plan(format!("unusable point count '{}'", label)));
        }
        points.push(SweepPoint {
            label: label.trim().to_string(),
            count,
        });
    }

    if let Some(pos) = section.block_sizes.iter().position(|&b| b == 0) {
        return Err(ConfigError::Plan(format!(
            "block size at position {} must be greater than zero",
            pos
        )));
    }

    Ok(SweepPlan {
        points,
        block_sizes: section.block_sizes.clone(),
    })
}
