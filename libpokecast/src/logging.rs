//! Logging setup shared by `poke-post` and `poke-history`
//!
//! Diagnostics always go to stderr; stdout carries only the run's result.
//!
//! | Variable               | Values                      | Default |
//! |------------------------|-----------------------------|---------|
//! | `POKECAST_LOG_FORMAT`  | `text`, `json`, `pretty`    | `text`  |
//! | `POKECAST_LOG_LEVEL`   | any `EnvFilter` directive   | `info`  |
//!
//! `--verbose` raises the level to `debug`. A set `RUST_LOG` wins over both.
//!
//! # Examples
//!
//! ```no_run
//! use libpokecast::logging::LoggingConfig;
//!
//! LoggingConfig::from_env(false).init();
//! tracing::info!("ready");
//! ```

use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "POKECAST_LOG_FORMAT";
pub const LEVEL_ENV: &str = "POKECAST_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";
const VERBOSE_LEVEL: &str = "debug";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines without targets, for terminals and cron mail
    #[default]
    Text,
    /// One flattened JSON object per event, for collected job output
    Json,
    /// Multi-line with source locations
    Pretty,
}

impl LogFormat {
    /// Case-insensitive; `None` for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub directive: String,
}

impl LoggingConfig {
    /// Read the format and level variables
    ///
    /// Unrecognized formats fall back to text rather than failing the run,
    /// since no subscriber exists yet to report the problem.
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var(FORMAT_ENV).ok();
        let level = std::env::var(LEVEL_ENV).ok();
        Self::resolve(format.as_deref(), level.as_deref(), verbose)
    }

    fn resolve(format: Option<&str>, level: Option<&str>, verbose: bool) -> Self {
        let directive = match level.map(str::trim) {
            _ if verbose => VERBOSE_LEVEL,
            Some(level) if !level.is_empty() => level,
            _ => DEFAULT_LEVEL,
        };

        Self {
            format: format.and_then(LogFormat::parse).unwrap_or_default(),
            directive: directive.to_string(),
        }
    }

    /// Install the global subscriber
    ///
    /// Call once at program start; a second call panics.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.directive));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        match self.format {
            LogFormat::Text => builder.with_target(false).init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .init(),
            LogFormat::Pretty => builder.pretty().with_file(true).with_line_number(true).init(),
        }
    }
}
