//! Supportability metrics of the event aggregators.

use harvest_config::EventType;
use harvest_statsd::{CounterMetric, GaugeMetric};

use crate::events::LogLevel;

/// Counter metrics reported by every event aggregator.
///
/// Names follow the pattern `<Category>/<Counter>`, where the category is
/// [`EventType::category`].
pub enum EventCounters {
    /// Events offered during a harvest window, reported once per harvest.
    ///
    /// Includes events that were discarded or displaced, and events re-admitted by a merge.
    Seen(EventType),
    /// Events returned by a harvest.
    Sent(EventType),
    /// The difference between seen and sent events of a harvest.
    Dropped(EventType),
    /// Incremented for every event whose producer failed or panicked.
    ProducerFailed(EventType),
}

impl CounterMetric for EventCounters {
    fn name(&self) -> &'static str {
        use EventType::*;

        match *self {
            Self::Seen(Transaction) => "TransactionEvent/Seen",
            Self::Seen(Error) => "ErrorEvent/Seen",
            Self::Seen(Custom) => "CustomEvent/Seen",
            Self::Seen(Log) => "Logging/Forwarding/Seen",
            Self::Seen(Synthetics) => "SyntheticsEvent/Seen",

            Self::Sent(Transaction) => "TransactionEvent/Sent",
            Self::Sent(Error) => "ErrorEvent/Sent",
            Self::Sent(Custom) => "CustomEvent/Sent",
            Self::Sent(Log) => "Logging/Forwarding/Sent",
            Self::Sent(Synthetics) => "SyntheticsEvent/Sent",

            Self::Dropped(Transaction) => "TransactionEvent/Dropped",
            Self::Dropped(Error) => "ErrorEvent/Dropped",
            Self::Dropped(Custom) => "CustomEvent/Dropped",
            Self::Dropped(Log) => "Logging/Forwarding/Dropped",
            Self::Dropped(Synthetics) => "SyntheticsEvent/Dropped",

            Self::ProducerFailed(Transaction) => "TransactionEvent/ProducerFailed",
            Self::ProducerFailed(Error) => "ErrorEvent/ProducerFailed",
            Self::ProducerFailed(Custom) => "CustomEvent/ProducerFailed",
            Self::ProducerFailed(Log) => "Logging/Forwarding/ProducerFailed",
            Self::ProducerFailed(Synthetics) => "SyntheticsEvent/ProducerFailed",
        }
    }
}

/// Counter metrics for recorded log lines.
///
/// These are counted for every log line, independent of whether the line is forwarded as an
/// event or retained by the reservoir.
pub enum LogCounters {
    /// All log lines.
    Lines,
    /// Log lines of a single severity.
    LinesBySeverity(LogLevel),
}

impl CounterMetric for LogCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Lines => "Logging/lines",
            Self::LinesBySeverity(LogLevel::Trace) => "Logging/lines/TRACE",
            Self::LinesBySeverity(LogLevel::Debug) => "Logging/lines/DEBUG",
            Self::LinesBySeverity(LogLevel::Info) => "Logging/lines/INFO",
            Self::LinesBySeverity(LogLevel::Warn) => "Logging/lines/WARN",
            Self::LinesBySeverity(LogLevel::Error) => "Logging/lines/ERROR",
            Self::LinesBySeverity(LogLevel::Fatal) => "Logging/lines/FATAL",
            Self::LinesBySeverity(LogLevel::Unknown) => "Logging/lines/UNKNOWN",
        }
    }
}

/// Counter metrics of the periodic harvest.
///
/// Tagged by `event_type`.
pub enum HarvestCounters {
    /// Events handed back to their aggregator after a retryable transport failure.
    Merged,
    /// Events discarded after a transport failure that cannot be retried.
    Discarded,
}

impl CounterMetric for HarvestCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Merged => "Supportability/Harvest/Merged",
            Self::Discarded => "Supportability/Harvest/Discarded",
        }
    }
}

/// Gauge metrics of the event aggregators.
pub enum EventGauges {
    /// The capacity under which the events of a harvest were collected.
    ///
    /// Tagged by `event_type`.
    ReservoirSize,
}

impl GaugeMetric for EventGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::ReservoirSize => "Supportability/Harvest/ReservoirSize",
        }
    }
}
