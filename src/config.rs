use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// How to start the parsing engine
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable
    pub program: String,
    /// Arguments placed before `--format`
    pub args: Vec<String>,
    /// Worker count passed as `-j<n>`; omitted when unset
    pub jobs: Option<usize>,
    /// Extra environment variables for the engine
    pub environment: HashMap<String, String>,
    /// Working directory for the engine
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "gnparser".to_string(),
            args: Vec::new(),
            jobs: Some(1),
            environment: HashMap::new(),
            working_dir: None,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Grace period for an engine to exit on shutdown, in milliseconds
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_exit_timeout_ms() -> u64 {
    5_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            exit_timeout_ms: default_exit_timeout_ms(),
            log_level: LogLevel::default(),
        }
    }
}

impl BridgeConfig {
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(BridgeError::Config(format!("Unknown log level: {}", other))),
        }
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path (TOML format)
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
    /// Built-in engine, timeout and log level defaults
    Defaults,
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> std::result::Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    let engine = EngineConfig::default();
    builder
        .set_default("engine.program", engine.program)?
        .set_default("engine.jobs", engine.jobs.map(|j| j as i64))?
        .set_default("exit_timeout_ms", default_exit_timeout_ms() as i64)?
        .set_default("log_level", "info")
}

/// Load the bridge configuration, later sources overriding earlier ones
pub fn load_config(sources: Vec<ConfigSource>) -> Result<BridgeConfig> {
    let mut builder = config::Config::builder();

    for source in sources {
        builder = match source {
            ConfigSource::File(path) if !path.exists() => {
                warn!("Configuration file not found: {}", path.display());
                builder
            }
            ConfigSource::File(path) => {
                debug!("Reading configuration file {}", path.display());
                builder.add_source(
                    config::File::from(path.as_path()).format(config::FileFormat::Toml),
                )
            }
            ConfigSource::Environment(prefix) => {
                debug!("Reading {}_* environment variables", prefix);
                builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                )
            }
            ConfigSource::Toml(text) => {
                builder.add_source(config::File::from_str(&text, config::FileFormat::Toml))
            }
            ConfigSource::Defaults => with_defaults(builder)
                .map_err(|e| BridgeError::Config(format!("Invalid default: {}", e)))?,
        };
    }

    let config: BridgeConfig = builder
        .build()
        .and_then(|merged| merged.try_deserialize())
        .map_err(|e| BridgeError::Config(format!("Failed to load configuration: {}", e)))?;

    debug!(
        "Engine {} {:?}, exit timeout {}ms, log level {:?}",
        config.engine.program, config.engine.args, config.exit_timeout_ms, config.log_level
    );
    Ok(config)
}

/// Configuration builder
pub struct ConfigBuilder {
    sources: Vec<ConfigSource>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a TOML file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables, e.g. `NAMEBRIDGE_ENGINE__PROGRAM`
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add the built-in defaults; sources added later override them
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    pub fn build(self) -> Result<BridgeConfig> {
        load_config(self.sources)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
