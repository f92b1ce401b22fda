use std::env;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prefix shared by all crates of the workspace.
///
/// Filter directives match on target prefixes, so this covers every `harvest_*` crate.
const CRATE_PREFIX: &str = "harvest_";

/// The level of a log message or the threshold of a log filter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Disables all logging.
    Off,
    /// Only errors.
    Error,
    /// Warnings and errors.
    Warn,
    /// The default level.
    #[default]
    Info,
    /// Information useful for debugging.
    Debug,
    /// Full auxiliary information.
    Trace,
}

impl Level {
    /// Returns the directive string understood by [`EnvFilter`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Converts the level into a `tracing` filter.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO harvest_aggregator::aggregator: transaction events capacity changed
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32.000Z  INFO harvest_aggregator::aggregator: transaction events capacity changed
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","target":"harvest_aggregator::aggregator","message":"transaction events capacity changed"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the harvest crates.
    ///
    /// Third party crates are capped at [`Level::Info`].
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

/// Builds the default filter if `RUST_LOG` is not set.
fn default_filter(level: Level) -> EnvFilter {
    let third_party = level.level_filter().min(LevelFilter::INFO);
    EnvFilter::new(format!(
        "{third_party},{CRATE_PREFIX}={}",
        level.as_str()
    ))
}

/// Initialize the logging system.
///
/// Calling this more than once has no effect, the first installed subscriber stays active.
///
/// # Example
///
/// ```ignore
/// let log_config = harvest_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// harvest_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: logging is initialized during startup, before the harvester spawns threads.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_ansi(true)
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .boxed(),
        (LogFormat::Json, _) => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}
