use std::fmt;
use std::sync::Arc;

use harvest_config::{EventType, LiveConfig};
use harvest_sampling::{PriorityReservoir, priority_for};
use harvest_statsd::metric;
use serde::Serialize;

use crate::aggregator::EventAggregator;
use crate::events::transaction::now_millis;
use crate::events::{Attributes, truncate_utf8};
use crate::statsd::LogCounters;

/// Severity of a forwarded log line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Trace.
    Trace,
    /// Debug.
    Debug,
    /// Info.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
    /// Fatal or critical.
    Fatal,
    /// Any severity the agent does not know.
    Unknown,
}

impl LogLevel {
    /// Interprets a severity name of a logging library, ignoring case.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" | "finest" => Self::Trace,
            "debug" | "fine" => Self::Debug,
            "info" | "information" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" | "err" => Self::Error,
            "fatal" | "critical" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Returns the uppercase name of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log line forwarded by the application.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEvent {
    /// The log message.
    pub message: String,
    /// The severity.
    pub level: LogLevel,
    /// Time of the log line in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The retention priority, inherited from the surrounding transaction if there is one.
    pub priority: f64,
    /// Context attributes.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl LogEvent {
    /// Creates a log event outside of a transaction at the current time.
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: now_millis(),
            priority: priority_for(false),
            attributes: Attributes::new(),
        }
    }
}

/// Collects forwarded log lines and counts lines per severity.
///
/// Counting and forwarding are configured separately: line metrics are emitted for every
/// non-empty record while `metrics_enabled` is set, even if forwarding is disabled or the line is
/// not retained.
#[derive(Debug)]
pub struct LogEventAggregator {
    inner: Arc<EventAggregator<PriorityReservoir<LogEvent>>>,
    config: LiveConfig,
}

impl LogEventAggregator {
    /// Creates the aggregator with the configured capacity.
    pub fn new(config: LiveConfig) -> Self {
        Self {
            inner: Arc::new(EventAggregator::new(EventType::Log, config.clone())),
            config,
        }
    }

    /// Records a log line and returns whether it was retained.
    ///
    /// Lines with an empty message are ignored. Long messages are truncated to
    /// `max_message_bytes` on a character boundary.
    pub fn record(&self, event: LogEvent) -> bool {
        if event.message.is_empty() {
            return false;
        }

        let (metrics_enabled, max_message_bytes) = {
            let config = self.config.load();
            (
                config.events.log.metrics_enabled,
                config.events.log.max_message_bytes,
            )
        };

        if metrics_enabled {
            metric!(counter(LogCounters::Lines) += 1);
            metric!(counter(LogCounters::LinesBySeverity(event.level)) += 1);
        }

        let priority = event.priority;
        self.inner.record_with(
            move || {
                let mut event = event;
                truncate_utf8(&mut event.message, max_message_bytes);
                event
            },
            Some(priority),
        )
    }

    /// Returns the underlying aggregator.
    pub fn aggregator(&self) -> &Arc<EventAggregator<PriorityReservoir<LogEvent>>> {
        &self.inner
    }
}
