//! Fuzzer configuration.
//!
//! Configuration is layered, lowest precedence first:
//!
//! 1. built-in defaults ([`FuzzConfig::default`])
//! 2. a TOML file ([`FuzzConfig::load`], every field optional)
//! 3. `ICHOR_*` environment variables ([`FuzzConfig::apply_env`])
//! 4. command-line flags, applied by the binary
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ICHOR_SEED` | Run seed | wall clock |
//! | `ICHOR_BUDGET` | Initial generation depth budget | 6 |
//! | `ICHOR_CHAOS_RATE` | 1-in-N chance of a registry-wide pick | 1000 |
//! | `ICHOR_SUBGEN_DEPTH` | Maximum nested sub-generation depth | 2 |
//! | `ICHOR_ITERATIONS` | Iterations per run (0 = until stopped) | 1 |
//! | `ICHOR_TURNS` | Turns per iteration | 50 |
//! | `ICHOR_MAX_ACTIVE_MODULES` | Modules chosen per iteration, at most | 4 |
//! | `ICHOR_TIME_LIMIT_MS` | Wall-clock limit for a run (0 = none) | none |
//! | `ICHOR_STOP_ON_FINDING` | Stop at the first finding | false |
//! | `ICHOR_TIMEOUT_MS` | Per-execution sandbox timeout | 5000 |
//! | `ICHOR_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | info |
//!
//! # Example
//!
//! ```rust,ignore
//! use ichor::config::FuzzConfig;
//!
//! let config = FuzzConfig::builder()
//!     .seed(42)
//!     .budget(4)
//!     .turns(20)
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log level, used as the fallback filter when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Grammar-level generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Initial depth budget for a top-level production.
    pub budget: u32,

    /// A production choice is replaced by a registry-wide pick with
    /// probability `1 / chaos_rate`. Zero disables the valve.
    pub chaos_rate: u32,

    /// How many times generated code may nest further generated code.
    pub max_subgeneration_depth: u32,

    /// Upper bound on statements emitted by one script command.
    pub max_statements: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            budget: 6,
            chaos_rate: 1000,
            max_subgeneration_depth: 2,
            max_statements: 3,
        }
    }
}

/// Driver loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Iterations per run. Zero runs until stopped.
    pub iterations: u64,

    /// Turns per iteration.
    pub turns_per_iteration: u32,

    /// At most this many modules are active in one iteration.
    pub max_active_modules: u32,

    /// Extra attempts when a module produces nothing.
    pub empty_turn_retries: u32,

    /// Wall-clock ceiling for the whole run, in milliseconds.
    pub time_limit_ms: Option<u64>,

    /// Stop after the first finding.
    pub stop_on_finding: bool,

    /// Execute admissible fragments in the sandbox.
    pub execute: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            turns_per_iteration: 50,
            max_active_modules: 4,
            empty_turn_retries: 3,
            time_limit_ms: None,
            stop_on_finding: false,
            execute: true,
        }
    }
}

impl DriverConfig {
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }
}

/// Oracle sampling and comparison settings.
///
/// Rates are 1-in-N; zero disables the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Nesting-consistency check, per eligible fragment.
    pub nesting_rate: u32,

    /// Parse-robustness bisection, per fragment.
    pub bisect_rate: u32,

    /// Leak check, per iteration.
    pub leak_rate: u32,

    /// Shallow wrapper depth for the nesting oracle.
    pub shallow_depth: u32,

    /// Deep wrapper depth for the nesting oracle.
    pub deep_depth: u32,

    /// Fixed reachable-object baseline. When unset the baseline is measured
    /// before each check.
    pub leak_baseline: Option<u64>,

    /// Objects above baseline tolerated after reclamation.
    pub leak_tolerance: u64,

    /// Forced reclamation passes before the after-count is taken.
    pub reclaim_passes: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            nesting_rate: 20,
            bisect_rate: 50,
            leak_rate: 10,
            shallow_depth: 2,
            deep_depth: 30,
            leak_baseline: None,
            leak_tolerance: 0,
            reclaim_passes: 3,
        }
    }
}

/// Settings for the process sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Engine shell binary.
    pub engine: Option<PathBuf>,

    /// Extra arguments placed before the script path.
    pub engine_args: Vec<String>,

    /// Per-execution timeout in milliseconds.
    pub timeout_ms: u64,

    /// Name of the engine's print function.
    pub print_function: String,

    /// Statement that asks the engine to collect garbage.
    pub reclaim_expression: Option<String>,

    /// Expression that evaluates to the number of reachable objects. The
    /// leak oracle needs it.
    pub count_expression: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            engine: None,
            engine_args: Vec::new(),
            timeout_ms: 5000,
            print_function: "print".to_string(),
            reclaim_expression: Some("gc()".to_string()),
            count_expression: None,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

/// Complete configuration for a fuzzing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Run seed. Derived from the clock when unset.
    pub seed: Option<u64>,
    pub generation: GenerationConfig,
    pub driver: DriverConfig,
    pub oracle: OracleConfig,
    pub sandbox: SandboxConfig,
    pub log: LogConfig,
    /// Module weight overrides by module name. Zero disables a module.
    pub modules: BTreeMap<String, u32>,
}

impl FuzzConfig {
    /// Create a new builder.
    pub fn builder() -> FuzzConfigBuilder {
        FuzzConfigBuilder::new()
    }

    /// Defaults overlaid with `ICHOR_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay `ICHOR_*` environment variables. Unset or unparsable
    /// variables leave the current value alone.
    pub fn apply_env(&mut self) {
        if let Some(val) = parse_env_u64("ICHOR_SEED") {
            self.seed = Some(val);
        }
        if let Some(val) = parse_env_u32("ICHOR_BUDGET") {
            self.generation.budget = val;
        }
        if let Some(val) = parse_env_u32("ICHOR_CHAOS_RATE") {
            self.generation.chaos_rate = val;
        }
        if let Some(val) = parse_env_u32("ICHOR_SUBGEN_DEPTH") {
            self.generation.max_subgeneration_depth = val;
        }
        if let Some(val) = parse_env_u64("ICHOR_ITERATIONS") {
            self.driver.iterations = val;
        }
        if let Some(val) = parse_env_u32("ICHOR_TURNS") {
            self.driver.turns_per_iteration = val;
        }
        if let Some(val) = parse_env_u32("ICHOR_MAX_ACTIVE_MODULES") {
            self.driver.max_active_modules = val;
        }
        if let Some(val) = parse_env_u64("ICHOR_TIME_LIMIT_MS") {
            self.driver.time_limit_ms = if val > 0 { Some(val) } else { None };
        }
        if let Some(val) = parse_env_bool("ICHOR_STOP_ON_FINDING") {
            self.driver.stop_on_finding = val;
        }
        if let Some(val) = parse_env_u64("ICHOR_TIMEOUT_MS") {
            self.sandbox.timeout_ms = val;
        }
        if let Ok(val) = env::var("ICHOR_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.log.level = level;
            }
        }
    }

    /// Check the configuration. Invalid configuration is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.max_statements == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generation.max_statements".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.driver.turns_per_iteration == 0 {
            return Err(ConfigError::InvalidValue {
                field: "driver.turns_per_iteration".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.driver.max_active_modules == 0 {
            return Err(ConfigError::InvalidValue {
                field: "driver.max_active_modules".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.sandbox.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sandbox.timeout_ms".into(),
                message: "must be positive".into(),
            });
        }

        if self.oracle.shallow_depth >= self.oracle.deep_depth {
            return Err(ConfigError::InvalidValue {
                field: "oracle.deep_depth".into(),
                message: "must be greater than oracle.shallow_depth".into(),
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Builder for [`FuzzConfig`].
#[derive(Debug, Clone, Default)]
pub struct FuzzConfigBuilder {
    config: FuzzConfig,
}

impl FuzzConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: FuzzConfig) -> Self {
        Self { config }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn budget(mut self, budget: u32) -> Self {
        self.config.generation.budget = budget;
        self
    }

    pub fn chaos_rate(mut self, rate: u32) -> Self {
        self.config.generation.chaos_rate = rate;
        self
    }

    pub fn max_subgeneration_depth(mut self, depth: u32) -> Self {
        self.config.generation.max_subgeneration_depth = depth;
        self
    }

    pub fn max_statements(mut self, n: u32) -> Self {
        self.config.generation.max_statements = n;
        self
    }

    pub fn iterations(mut self, n: u64) -> Self {
        self.config.driver.iterations = n;
        self
    }

    pub fn turns(mut self, n: u32) -> Self {
        self.config.driver.turns_per_iteration = n;
        self
    }

    pub fn max_active_modules(mut self, n: u32) -> Self {
        self.config.driver.max_active_modules = n;
        self
    }

    pub fn time_limit(mut self, limit: Option<Duration>) -> Self {
        self.config.driver.time_limit_ms = limit.map(|d| d.as_millis() as u64);
        self
    }

    pub fn stop_on_finding(mut self, enabled: bool) -> Self {
        self.config.driver.stop_on_finding = enabled;
        self
    }

    pub fn execute(mut self, enabled: bool) -> Self {
        self.config.driver.execute = enabled;
        self
    }

    pub fn oracle(mut self, oracle: OracleConfig) -> Self {
        self.config.oracle = oracle;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.sandbox.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn engine(mut self, engine: impl Into<PathBuf>) -> Self {
        self.config.sandbox.engine = Some(engine.into());
        self
    }

    pub fn module_weight(mut self, name: impl Into<String>, weight: u32) -> Self {
        self.config.modules.insert(name.into(), weight);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log.level = level;
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> Result<FuzzConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> FuzzConfig {
        self.config
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|s| match s.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FuzzConfig::default();
        assert_eq!(config.seed, None);
        assert_eq!(config.generation.budget, 6);
        assert_eq!(config.generation.chaos_rate, 1000);
        assert_eq!(config.driver.iterations, 1);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FuzzConfig::builder()
            .seed(42)
            .budget(4)
            .turns(10)
            .time_limit(Some(Duration::from_secs(2)))
            .module_weight("host", 0)
            .log_level(LogLevel::Debug)
            .build()
            .unwrap();

        assert_eq!(config.seed, Some(42));
        assert_eq!(config.generation.budget, 4);
        assert_eq!(config.driver.turns_per_iteration, 10);
        assert_eq!(config.driver.time_limit(), Some(Duration::from_secs(2)));
        assert_eq!(config.modules.get("host"), Some(&0));
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[test]
    fn test_builder_validation() {
        assert!(FuzzConfig::builder().turns(0).build().is_err());
        assert!(FuzzConfig::builder().max_active_modules(0).build().is_err());
        assert!(FuzzConfig::builder().timeout(Duration::ZERO).build().is_err());
        // build_unchecked skips validation
        let config = FuzzConfig::builder().turns(0).build_unchecked();
        assert_eq!(config.driver.turns_per_iteration, 0);
    }

    #[test]
    fn test_oracle_depths_validated() {
        let oracle = OracleConfig {
            shallow_depth: 5,
            deep_depth: 5,
            ..OracleConfig::default()
        };
        let err = FuzzConfig::builder().oracle(oracle).build().unwrap_err();
        assert!(err.to_string().contains("oracle.deep_depth"));
    }

    #[test]
    fn test_toml_partial() {
        let config = FuzzConfig::from_toml_str(
            r#"
            seed = 7

            [generation]
            budget = 3

            [oracle]
            leak_baseline = 120

            [modules]
            nodes = 5
            host = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.generation.budget, 3);
        assert_eq!(config.generation.chaos_rate, 1000);
        assert_eq!(config.oracle.leak_baseline, Some(120));
        assert_eq!(config.modules.get("nodes"), Some(&5));
        assert_eq!(config.sandbox.print_function, "print");
    }

    #[test]
    fn test_toml_rejects_bad_types() {
        let err = FuzzConfig::from_toml_str("[generation]\nbudget = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FuzzConfig::load(Path::new("/nonexistent/ichor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::Debug.as_str(), "debug");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "driver.turns_per_iteration".into(),
            message: "must be at least 1".into(),
        };
        assert!(err.to_string().contains("driver.turns_per_iteration"));
    }
}
