//! Per event type settings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The kinds of events that are sampled and harvested independently.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Completed transactions.
    Transaction,
    /// Errors noticed by the instrumentation.
    Error,
    /// Events recorded through the custom event API.
    Custom,
    /// Forwarded application log lines.
    Log,
    /// Transactions triggered by a synthetic monitor.
    Synthetics,
}

impl EventType {
    /// Returns all event types.
    pub fn all() -> &'static [Self] {
        &[
            Self::Transaction,
            Self::Error,
            Self::Custom,
            Self::Log,
            Self::Synthetics,
        ]
    }

    /// Returns the configuration name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Error => "error",
            Self::Custom => "custom",
            Self::Log => "log",
            Self::Synthetics => "synthetics",
        }
    }

    /// Returns the capacity used when no valid capacity is configured.
    pub fn default_capacity(&self) -> usize {
        match self {
            Self::Transaction => 1200,
            Self::Error => 100,
            Self::Custom => 3000,
            Self::Log => 10_000,
            Self::Synthetics => 200,
        }
    }

    /// Returns the category under which supportability metrics of this type are reported.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transaction => "TransactionEvent",
            Self::Error => "ErrorEvent",
            Self::Custom => "CustomEvent",
            Self::Log => "Logging/Forwarding",
            Self::Synthetics => "SyntheticsEvent",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured capacity was not a non-negative integer.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid capacity {raw}: {reason}")]
pub struct InvalidCapacity {
    /// The raw configured value.
    pub raw: String,
    /// Why the value was rejected.
    pub reason: &'static str,
}

/// The configured maximum number of events retained per harvest window.
///
/// Capacities come from user supplied configuration, so any scalar is accepted when loading.
/// Values that are not non-negative integers are kept as [`CapacitySetting::Invalid`] and later
/// replaced by the event type's default, see [`crate::Config::normalize`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CapacitySetting {
    /// Use the default capacity of the event type.
    #[default]
    Default,
    /// An explicit capacity.
    Value(usize),
    /// A value that could not be interpreted as capacity.
    Invalid(String),
}

impl CapacitySetting {
    /// Interprets a raw configuration value as capacity.
    ///
    /// Integral floats and numeric strings are accepted, since configuration often arrives
    /// through environment variables or loosely typed sources.
    pub fn parse(value: &Value) -> Result<Self, InvalidCapacity> {
        let invalid = |reason| InvalidCapacity {
            raw: value.to_string(),
            reason,
        };

        match value {
            Value::Null => Ok(Self::Default),
            Value::Number(number) => {
                if let Some(n) = number.as_u64() {
                    usize::try_from(n)
                        .map(Self::Value)
                        .map_err(|_| invalid("out of range"))
                } else if number.as_i64().is_some() {
                    Err(invalid("negative"))
                } else {
                    match number.as_f64() {
                        Some(f) if f < 0.0 => Err(invalid("negative")),
                        Some(f) if f.fract() == 0.0 && f <= usize::MAX as f64 => {
                            Ok(Self::Value(f as usize))
                        }
                        _ => Err(invalid("not an integer")),
                    }
                }
            }
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(n) if n < 0 => Err(invalid("negative")),
                Ok(n) => usize::try_from(n)
                    .map(Self::Value)
                    .map_err(|_| invalid("out of range")),
                Err(_) => Err(invalid("not a number")),
            },
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(invalid("not a number")),
        }
    }

    /// Returns the effective capacity, falling back to `default`.
    pub fn resolve(&self, default: usize) -> usize {
        match self {
            Self::Value(capacity) => *capacity,
            Self::Default | Self::Invalid(_) => default,
        }
    }
}

impl From<usize> for CapacitySetting {
    fn from(value: usize) -> Self {
        Self::Value(value)
    }
}

impl<'de> Deserialize<'de> for CapacitySetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::parse(&value).unwrap_or_else(|error| Self::Invalid(error.raw)))
    }
}

impl Serialize for CapacitySetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Default => serializer.serialize_none(),
            Self::Value(capacity) => serializer.serialize_u64(*capacity as u64),
            Self::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

/// Settings shared by all event types.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EventTypeConfig {
    /// Whether events of this type are recorded at all.
    ///
    /// Defaults to `true`.
    pub enabled: bool,

    /// Maximum number of events retained per harvest window.
    ///
    /// Changes take effect at the next harvest. Defaults to the event type's default capacity.
    pub max_samples_stored: CapacitySetting,
}

impl Default for EventTypeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_samples_stored: CapacitySetting::Default,
        }
    }
}

/// Settings for forwarded log events.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogEventsConfig {
    /// Settings for forwarding log lines as events.
    #[serde(flatten)]
    pub forwarding: EventTypeConfig,

    /// Whether log lines are counted per severity, independently of forwarding.
    ///
    /// Defaults to `true`.
    pub metrics_enabled: bool,

    /// Messages longer than this are truncated before they are retained.
    ///
    /// Defaults to `32768` bytes.
    pub max_message_bytes: usize,
}

impl Default for LogEventsConfig {
    fn default() -> Self {
        Self {
            forwarding: EventTypeConfig::default(),
            metrics_enabled: true,
            max_message_bytes: 32 * 1024,
        }
    }
}

/// Settings for all event types.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Transaction events.
    pub transaction: EventTypeConfig,
    /// Error events.
    pub error: EventTypeConfig,
    /// Custom events.
    pub custom: EventTypeConfig,
    /// Log events.
    pub log: LogEventsConfig,
    /// Synthetics transaction events.
    pub synthetics: EventTypeConfig,
}

impl EventsConfig {
    /// Returns the settings of an event type.
    pub fn get(&self, event_type: EventType) -> &EventTypeConfig {
        match event_type {
            EventType::Transaction => &self.transaction,
            EventType::Error => &self.error,
            EventType::Custom => &self.custom,
            EventType::Log => &self.log.forwarding,
            EventType::Synthetics => &self.synthetics,
        }
    }

    /// Returns mutable settings of an event type.
    pub fn get_mut(&mut self, event_type: EventType) -> &mut EventTypeConfig {
        match event_type {
            EventType::Transaction => &mut self.transaction,
            EventType::Error => &mut self.error,
            EventType::Custom => &mut self.custom,
            EventType::Log => &mut self.log.forwarding,
            EventType::Synthetics => &mut self.synthetics,
        }
    }

    /// Returns the effective capacity of an event type.
    pub fn capacity(&self, event_type: EventType) -> usize {
        self.get(event_type)
            .max_samples_stored
            .resolve(event_type.default_capacity())
    }

    /// Returns `true` if events of this type are recorded.
    pub fn enabled(&self, event_type: EventType) -> bool {
        self.get(event_type).enabled
    }

    /// Replaces invalid capacities with the defaults and logs each replacement.
    pub fn normalize(&mut self) {
        for &event_type in EventType::all() {
            let setting = &mut self.get_mut(event_type).max_samples_stored;
            if let CapacitySetting::Invalid(raw) = setting {
                harvest_log::warn!(
                    event_type = event_type.as_str(),
                    "invalid capacity {raw} for {event_type} events, using default of {}",
                    event_type.default_capacity(),
                );
                *setting = CapacitySetting::Default;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_parse_capacity() {
        assert_eq!(
            CapacitySetting::parse(&json!(5)),
            Ok(CapacitySetting::Value(5))
        );
        assert_eq!(
            CapacitySetting::parse(&json!(10.0)),
            Ok(CapacitySetting::Value(10))
        );
        assert_eq!(
            CapacitySetting::parse(&json!(" 42 ")),
            Ok(CapacitySetting::Value(42))
        );
        assert_eq!(
            CapacitySetting::parse(&json!(null)),
            Ok(CapacitySetting::Default)
        );
    }

    #[test]
    fn test_parse_invalid_capacity() {
        let error = CapacitySetting::parse(&json!(-3)).unwrap_err();
        assert_eq!(error.reason, "negative");
        assert_eq!(error.raw, "-3");

        let error = CapacitySetting::parse(&json!(2.5)).unwrap_err();
        assert_eq!(error.reason, "not an integer");

        let error = CapacitySetting::parse(&json!("lots")).unwrap_err();
        assert_eq!(error.reason, "not a number");

        let error = CapacitySetting::parse(&json!(true)).unwrap_err();
        assert_eq!(error.to_string(), "invalid capacity true: not a number");
    }

    #[test]
    fn test_invalid_capacity_resolves_to_default() {
        let config: EventTypeConfig =
            serde_json::from_value(json!({"max_samples_stored": -1})).unwrap();
        assert_eq!(
            config.max_samples_stored,
            CapacitySetting::Invalid("-1".to_owned())
        );
        assert_eq!(config.max_samples_stored.resolve(100), 100);
    }

    #[test]
    fn test_normalize() {
        harvest_test::setup();

        let mut config = EventsConfig::default();
        config.error.max_samples_stored = CapacitySetting::Invalid("\"many\"".to_owned());
        config.custom.max_samples_stored = CapacitySetting::Value(7);
        config.normalize();

        assert_eq!(config.error.max_samples_stored, CapacitySetting::Default);
        assert_eq!(config.capacity(EventType::Error), 100);
        assert_eq!(config.capacity(EventType::Custom), 7);
    }

    #[test]
    fn test_log_config_flatten() {
        let config: LogEventsConfig = serde_json::from_value(json!({
            "enabled": false,
            "max_samples_stored": 20,
            "metrics_enabled": true,
        }))
        .unwrap();

        assert!(!config.forwarding.enabled);
        assert_eq!(config.forwarding.max_samples_stored, CapacitySetting::Value(20));
        assert_eq!(config.max_message_bytes, 32768);
    }
}
