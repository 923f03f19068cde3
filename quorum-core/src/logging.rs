//! Subscriber setup for binaries and test harnesses.
//!
//! Library code only emits `tracing` events. Whoever owns the process
//! installs a subscriber once:
//!
//! ```ignore
//! quorum_core::logging::init_tracing(&TracingConfig::from_env())?;
//! ```
//!
//! `QUORUM_LOG` (falling back to `RUST_LOG`) holds the filter directives,
//! `QUORUM_LOG_FORMAT` one of `json`, `pretty` or `compact`.

use anyhow::{Context, Result};
use std::str::FromStr;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, TestWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    Json,
    /// Multi-line, human-readable.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to the default format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        })
    }
}

/// What [`init_tracing`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Line format.
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info,quorum_server::simulation=debug`.
    pub filter: String,
    /// Write through libtest's capture instead of stderr.
    pub test_writer: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "info".to_string(),
            test_writer: false,
        }
    }
}

impl TracingConfig {
    /// Read `QUORUM_LOG_FORMAT` and `QUORUM_LOG` (or `RUST_LOG`).
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Compact output at `filter`, captured per test.
    pub fn for_tests(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            test_writer: true,
            ..Self::default()
        }
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let format = var("QUORUM_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let filter = var("QUORUM_LOG")
            .or_else(|| var("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());
        Self {
            format,
            filter,
            test_writer: false,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Invalid filter directives fall back to `info`. Fails if a global
/// subscriber is already set; test binaries calling this from every test
/// ignore that.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = if config.test_writer {
        BoxMakeWriter::new(TestWriter::new)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let layer = fmt::layer().with_writer(writer).with_target(true);
    let layer = match config.format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")
}
