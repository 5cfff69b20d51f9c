//! Logging configuration
//!
//! Logs go to stderr so they never mix with step outputs. `RUST_LOG` wins over
//! `LOG_LEVEL` when both are set.

use colored::Colorize;
use tracing::error;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::app::env::EnvVars;
use crate::errors::DeployDataError;

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub log_level: LogLevel,

    /// One JSON object per line, for log collectors
    pub json_format: bool,

    /// Colored output; runners render ANSI in the job log
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_format: false,
            ansi: true,
        }
    }
}

impl LogOptions {
    /// Read `LOG_LEVEL`, `LOG_FORMAT` and `NO_COLOR`; unknown levels fall back to info
    pub fn from_env(env: &EnvVars) -> Self {
        let log_level = env
            .get("LOG_LEVEL")
            .and_then(|level| level.parse().ok())
            .unwrap_or_default();
        let json_format = env
            .get("LOG_FORMAT")
            .is_some_and(|format| format.eq_ignore_ascii_case("json"));
        Self {
            log_level,
            json_format,
            ansi: !json_format && !env.present("NO_COLOR"),
        }
    }
}

/// Initialize logging
pub fn init_logging(options: LogOptions) -> Result<(), DeployDataError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    let subscriber = tracing_subscriber::registry().with(filter);

    if options.json_format {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| DeployDataError::ConfigError(e.to_string()))?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(options.ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| DeployDataError::ConfigError(e.to_string()))?;
    }

    Ok(())
}

/// Log a pipeline failure highlighted in red
pub fn log_failure(message: &str) {
    error!("{}", message.red().bold());
}
