//! Process-wide log setup.
//!
//! `log` records emitted by the database layer are forwarded into `tracing`
//! through `LogTracer`, so one subscriber sees everything. The filter comes
//! from `RUST_LOG` and falls back to the given default.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Selects JSON lines instead of the human-readable format.
pub const ENV_LOG_FORMAT: &str = "DECALFORGE_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(ENV_LOG_FORMAT) {
            Ok(value) => Self::parse(&value),
            Err(_) => LogFormat::Pretty,
        }
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<(), io::Error> {
    tracing_log::LogTracer::init().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
