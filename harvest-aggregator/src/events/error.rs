use std::sync::Arc;

use harvest_config::{EventType, LiveConfig};
use harvest_sampling::{PriorityReservoir, priority_for};
use serde::Serialize;

use crate::aggregator::EventAggregator;
use crate::events::Attributes;
use crate::events::transaction::now_millis;

/// An error noticed by the instrumentation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorEvent {
    /// The class or type name of the error.
    pub error_class: String,
    /// The error message.
    pub message: String,
    /// The transaction during which the error occurred, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_name: Option<String>,
    /// Time of the error in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The retention priority.
    ///
    /// Errors inherit the priority of their transaction, so errors of sampled transactions are
    /// retained first.
    pub priority: f64,
    /// Custom and agent attributes.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl ErrorEvent {
    /// Creates an error event outside of a transaction.
    pub fn new(error_class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_class: error_class.into(),
            message: message.into(),
            transaction_name: None,
            timestamp: now_millis(),
            priority: priority_for(false),
            attributes: Attributes::new(),
        }
    }
}

/// Collects error events, keeping those with the highest priority.
#[derive(Debug)]
pub struct ErrorEventAggregator {
    inner: Arc<EventAggregator<PriorityReservoir<ErrorEvent>>>,
}

impl ErrorEventAggregator {
    /// Creates the aggregator with the configured capacity.
    pub fn new(config: LiveConfig) -> Self {
        Self {
            inner: Arc::new(EventAggregator::new(EventType::Error, config)),
        }
    }

    /// Records an error event and returns whether it was retained.
    pub fn record(&self, event: ErrorEvent) -> bool {
        let priority = event.priority;
        self.inner.record(event, Some(priority))
    }

    /// Returns the underlying aggregator.
    pub fn aggregator(&self) -> &Arc<EventAggregator<PriorityReservoir<ErrorEvent>>> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use harvest_config::{CapacitySetting, Config};

    use super::*;

    #[test]
    fn test_keeps_highest_priority() {
        let mut config = Config::default();
        config.events.error.max_samples_stored = CapacitySetting::Value(1);
        let aggregator = ErrorEventAggregator::new(LiveConfig::new(config));

        let mut deadly = ErrorEvent::new("RuntimeError", "Deadly");
        deadly.priority = 0.5;
        let mut buggy = ErrorEvent::new("RuntimeError", "Buggy");
        buggy.priority = 0.9;

        aggregator.record(deadly);
        aggregator.record(buggy);

        let harvest = aggregator.aggregator().harvest();
        let messages: Vec<_> = harvest.events().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["Buggy"]);
        assert_eq!(harvest.metadata().events_seen, 2);
        assert_eq!(harvest.metadata().reservoir_size, 1);
    }

    #[test]
    fn test_serialize() {
        let event = ErrorEvent {
            error_class: "KeyError".to_owned(),
            message: "missing key".to_owned(),
            transaction_name: Some("OtherTransaction/Job/import".to_owned()),
            timestamp: 1_700_000_000_000,
            priority: 1.25,
            attributes: Attributes::new(),
        };

        insta::assert_json_snapshot!(event, @r#"
        {
          "error_class": "KeyError",
          "message": "missing key",
          "transaction_name": "OtherTransaction/Job/import",
          "timestamp": 1700000000000,
          "priority": 1.25
        }
        "#);
    }
}
