use crate::buffer::{BufferConfig, ClosePolicy};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Interval between buffer load samples in milliseconds
    #[arg(long, env = "SAMPLE_INTERVAL_MS", default_value = "1000")]
    pub sample_interval_ms: u64,

    /// Lines in flight between the buffer and the output writer
    #[arg(long, env = "OUTPUT_CAPACITY", default_value = "1")]
    pub output_capacity: usize,

    /// Lines in flight between the input reader and the buffer
    #[arg(long, env = "INPUT_CAPACITY", default_value = "1024")]
    pub input_capacity: usize,

    /// What to do with buffered lines on shutdown
    #[arg(long, env = "CLOSE_POLICY", default_value = "drain")]
    pub close_policy: ClosePolicy,

    /// Buffered line count at which an overload warning is logged
    #[arg(long, env = "OVERLOAD_THRESHOLD")]
    pub overload_threshold: Option<usize>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// TOML configuration file. When given, its values (or their defaults)
    /// replace every other flag and environment variable
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived buffer configuration (not a CLI argument)
    #[serde(skip)]
    #[arg(skip)]
    pub buffer: BufferConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            output_capacity: 1,
            input_capacity: 1024,
            close_policy: ClosePolicy::Drain,
            overload_threshold: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
            buffer: BufferConfig::default(),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    /// Parses CLI args and env, then replaces them with the config file if
    /// one was given. Values are not merged: options missing from the file
    /// take their defaults, not the CLI value.
    pub fn from_args_and_file<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::from_args(args)?;
        match &config.config_file {
            Some(path) => Self::from_file(path),
            None => Ok(config),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = Some(path.as_ref().to_path_buf());
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) {
        self.buffer = BufferConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            output_capacity: self.output_capacity,
            close_policy: self.close_policy,
        };
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buffer
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        if self.input_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Input capacity must be greater than 0".to_string(),
            ));
        }

        if self.overload_threshold == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Overload threshold must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
