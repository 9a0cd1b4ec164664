//! Structured logging setup, mirroring the teacher's `logging.rs`:
//! configurable JSON-vs-pretty `tracing-subscriber` init, driven either
//! by an explicit [`LogConfig`] or `RUST_LOG`/env vars.

use anyhow::Result;
use std::io;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, layer::SubscriberExt, EnvFilter, Registry};

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Enable JSON format (default: true for production).
    pub json_format: bool,

    /// Enable span open/close events (default: true).
    pub log_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json_format: true,
            log_spans: true,
        }
    }
}

impl LogConfig {
    pub fn production() -> Self {
        LogConfig {
            level: "info".to_string(),
            json_format: true,
            log_spans: true,
        }
    }

    pub fn development() -> Self {
        LogConfig {
            level: "debug".to_string(),
            json_format: false,
            log_spans: true,
        }
    }
}

/// Initialize structured logging with the given configuration.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("info"))?;
    let span_events = if config.log_spans { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(true)
            .with_target(true)
            .with_writer(io::stderr);
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = fmt::layer().pretty().with_span_events(span_events).with_target(true).with_writer(io::stderr);
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Initialize logging from environment variables: `RUST_LOG` for the
/// level, `HNSWPAGE_LOG_FORMAT=pretty` to opt out of JSON.
pub fn init_from_env() -> Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let json_format = std::env::var("HNSWPAGE_LOG_FORMAT").map(|v| v != "pretty").unwrap_or(true);
    init_logging(LogConfig { level, json_format, log_spans: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_production_shaped() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.json_format);
    }

    #[test]
    fn development_config_is_pretty_and_debug() {
        let config = LogConfig::development();
        assert_eq!(config.level, "debug");
        assert!(!config.json_format);
    }
}
