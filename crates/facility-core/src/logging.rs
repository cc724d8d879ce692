//! Logging setup shared by the client library and the harness binary.
//!
//! ```ignore
//! use facility_core::logging::{init_logging, LogConfig};
//!
//! init_logging(LogConfig::harness(verbose))?;
//! ```
//!
//! `RUST_LOG` overrides the configured level unless an explicit directive is
//! set on the config.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Target prefix matching every crate in this workspace.
pub const LOG_TARGET_PREFIX: &str = "facility";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level applied to workspace crates when no directive overrides it.
    pub level: Level,
    pub format: LogFormat,
    /// Include source file and line.
    pub with_location: bool,
    pub with_timestamp: bool,
    /// Explicit `EnvFilter` directive; wins over `RUST_LOG` and `level`.
    pub directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            with_location: false,
            with_timestamp: true,
            directive: None,
        }
    }
}

impl LogConfig {
    /// Settings for the operator harness: quiet by default, chatty with
    /// `verbose`.
    #[must_use]
    pub fn harness(verbose: bool) -> Self {
        if verbose {
            Self {
                level: Level::DEBUG,
                with_location: true,
                with_timestamp: false,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Builds the filter from the directive, `RUST_LOG`, or the level, in
    /// that order.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        if let Some(ref directive) = self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{LOG_TARGET_PREFIX}={}", self.level))))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_file(self.with_location)
            .with_line_number(self.with_location)
            .with_target(true);

        match (self.format, self.with_timestamp) {
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber. Call once at process start.
pub fn init_logging(config: LogConfig) -> Result<(), LogError> {
    let filter = config.filter()?;
    let subscriber = tracing_subscriber::registry()
        .with(config.layer())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
