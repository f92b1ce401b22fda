use std::sync::Arc;

use harvest_config::{EventType, LiveConfig};
use harvest_log::LogError;
use harvest_sampling::PriorityReservoir;
use serde::Serialize;
use serde_json::Value;

use crate::aggregator::EventAggregator;
use crate::events::transaction::now_millis;
use crate::events::{Attributes, truncate_utf8};

/// Maximum length of custom event type names, attribute keys and string values in bytes.
pub const MAX_CUSTOM_EVENT_FIELD_BYTES: usize = 255;

/// Maximum number of attributes retained per custom event.
pub const MAX_CUSTOM_EVENT_ATTRIBUTES: usize = 64;

/// A custom event was rejected.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CustomEventError {
    /// The event type name is empty or contains characters other than alphanumerics, `:`, `_`
    /// and spaces.
    #[error("invalid custom event type {0:?}")]
    InvalidType(String),
    /// The event type name is longer than [`MAX_CUSTOM_EVENT_FIELD_BYTES`].
    #[error("custom event type is {0} bytes long, at most 255 are allowed")]
    TypeTooLong(usize),
}

/// Checks that a custom event type name can be recorded.
pub fn validate_event_type(event_type: &str) -> Result<(), CustomEventError> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | ' ');

    if event_type.is_empty() || !event_type.chars().all(valid_char) {
        return Err(CustomEventError::InvalidType(event_type.to_owned()));
    }

    if event_type.len() > MAX_CUSTOM_EVENT_FIELD_BYTES {
        return Err(CustomEventError::TypeTooLong(event_type.len()));
    }

    Ok(())
}

/// An event recorded through the custom event API.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomEvent {
    /// The user supplied event type name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Time of the event in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// User supplied attributes.
    pub attributes: Attributes,
}

impl CustomEvent {
    /// Creates a custom event at the current time.
    pub fn new(event_type: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: now_millis(),
            attributes,
        }
    }

    /// Truncates attribute keys and string values, and limits the number of attributes.
    fn sanitize(self) -> Self {
        let attributes = self
            .attributes
            .into_iter()
            .take(MAX_CUSTOM_EVENT_ATTRIBUTES)
            .map(|(mut key, mut value)| {
                truncate_utf8(&mut key, MAX_CUSTOM_EVENT_FIELD_BYTES);
                if let Value::String(s) = &mut value {
                    truncate_utf8(s, MAX_CUSTOM_EVENT_FIELD_BYTES);
                }
                (key, value)
            })
            .collect();

        Self { attributes, ..self }
    }
}

/// Collects custom events.
///
/// Events with an invalid type name are dropped with a warning and are not counted as seen.
#[derive(Debug)]
pub struct CustomEventAggregator {
    inner: Arc<EventAggregator<PriorityReservoir<CustomEvent>>>,
}

impl CustomEventAggregator {
    /// Creates the aggregator with the configured capacity.
    pub fn new(config: LiveConfig) -> Self {
        Self {
            inner: Arc::new(EventAggregator::new(EventType::Custom, config)),
        }
    }

    /// Records a custom event and returns whether it was retained.
    ///
    /// Without a priority, events are sampled randomly. Attributes are only sanitized if the
    /// event is retained.
    pub fn record(&self, event: CustomEvent, priority: Option<f64>) -> bool {
        if let Err(error) = validate_event_type(&event.event_type) {
            harvest_log::warn!("dropping custom event: {}", LogError(&error));
            return false;
        }

        self.inner.record_with(|| event.sanitize(), priority)
    }

    /// Returns the underlying aggregator.
    pub fn aggregator(&self) -> &Arc<EventAggregator<PriorityReservoir<CustomEvent>>> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_validate_event_type() {
        assert_eq!(validate_event_type("Purchase"), Ok(()));
        assert_eq!(validate_event_type("cart:item added_2"), Ok(()));
        assert_eq!(
            validate_event_type("bad-type"),
            Err(CustomEventError::InvalidType("bad-type".to_owned()))
        );
        assert_eq!(
            validate_event_type(""),
            Err(CustomEventError::InvalidType(String::new()))
        );
        assert_eq!(
            validate_event_type(&"a".repeat(256)),
            Err(CustomEventError::TypeTooLong(256))
        );
        assert_eq!(validate_event_type(&"a".repeat(255)), Ok(()));
    }

    #[test]
    fn test_invalid_event_not_counted() {
        harvest_test::setup();

        let aggregator = CustomEventAggregator::new(LiveConfig::default());
        assert!(!aggregator.record(CustomEvent::new("no/slashes", Attributes::new()), None));
        assert!(aggregator.record(CustomEvent::new("Purchase", Attributes::new()), None));

        assert_eq!(aggregator.aggregator().metadata().seen, 1);
    }

    #[test]
    fn test_sanitize() {
        let mut attributes = Attributes::new();
        for i in 0..70 {
            attributes.insert(format!("key{i:02}"), json!(i));
        }
        attributes.insert("key00".to_owned(), json!("x".repeat(300)));
        attributes.insert("k".repeat(300), json!(true));

        let aggregator = CustomEventAggregator::new(LiveConfig::default());
        aggregator.record(CustomEvent::new("Purchase", attributes), None);

        let harvest = aggregator.aggregator().harvest();
        let event = harvest.events().next().unwrap();

        assert_eq!(event.attributes.len(), MAX_CUSTOM_EVENT_ATTRIBUTES);
        assert_eq!(event.attributes["key00"], json!("x".repeat(255)));
        assert!(event.attributes.keys().all(|key| key.len() <= 255));
        assert!(!event.attributes.contains_key("key69"));
    }
}
