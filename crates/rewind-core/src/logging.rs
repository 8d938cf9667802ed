//! Logging configuration and initialization for host binaries.
//!
//! Provides preset-based tracing setup with text or JSON output and an
//! environment variable fallback (RUST_LOG). The engine itself only emits
//! `tracing` events under the `rewind::*` targets; hosts decide how they
//! are rendered.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Production: important events only
    #[default]
    Production,
    /// Debug: detailed info for troubleshooting
    Debug,
    /// Trace: everything including high-frequency data
    Trace,
    /// Quiet: warnings and errors only
    Quiet,
}

/// Logging configuration built from host flags.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    pub format: LogFormat,
}

impl LogConfig {
    /// Create a LogConfig from host CLI flags (last one wins if multiple
    /// are specified).
    pub fn from_flags(debug: bool, trace: bool, quiet: bool, format: LogFormat) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else {
            LogPreset::Production
        };
        Self { preset, format }
    }

    /// Build an EnvFilter from this configuration. RUST_LOG takes
    /// precedence when set.
    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let directive = match self.preset {
            LogPreset::Production => "rewind=info",
            LogPreset::Debug => "rewind=debug",
            LogPreset::Trace => "rewind=trace",
            LogPreset::Quiet => "rewind=warn",
        };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the tracing subscriber with the given configuration.
pub fn init_logging(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}
