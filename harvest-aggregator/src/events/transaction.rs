use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use harvest_config::{EventType, LiveConfig};
use harvest_sampling::{PriorityReservoir, priority_for};
use serde::Serialize;

use crate::aggregator::EventAggregator;
use crate::events::{Attributes, SyntheticsEventAggregator};

/// Returns the current time in milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// A completed transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransactionEvent {
    /// The transaction name, such as `WebTransaction/Controller/users/show`.
    pub name: String,
    /// Start of the transaction in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Duration of the transaction in seconds.
    pub duration: f64,
    /// The retention priority, see [`priority_for`].
    pub priority: f64,
    /// Whether the transaction was selected for detailed tracing.
    pub sampled: bool,
    /// Set if the transaction was triggered by a synthetic monitor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetics_resource_id: Option<String>,
    /// Custom and agent attributes.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl TransactionEvent {
    /// Creates an event for a transaction that just finished.
    ///
    /// The priority ranks sampled transactions above all others.
    pub fn new(name: impl Into<String>, duration: Duration, sampled: bool) -> Self {
        Self {
            name: name.into(),
            timestamp: now_millis().saturating_sub(duration.as_millis() as u64),
            duration: duration.as_secs_f64(),
            priority: priority_for(sampled),
            sampled,
            synthetics_resource_id: None,
            attributes: Attributes::new(),
        }
    }
}

/// Collects transaction events.
///
/// Transactions triggered by synthetic monitors are first offered to the
/// [`SyntheticsEventAggregator`]. Only if it has no room left do they compete with regular
/// transactions.
#[derive(Debug)]
pub struct TransactionEventAggregator {
    inner: Arc<EventAggregator<PriorityReservoir<TransactionEvent>>>,
    synthetics: Arc<SyntheticsEventAggregator>,
}

impl TransactionEventAggregator {
    /// Creates the aggregator with the configured capacity.
    pub fn new(config: LiveConfig, synthetics: Arc<SyntheticsEventAggregator>) -> Self {
        Self {
            inner: Arc::new(EventAggregator::new(EventType::Transaction, config)),
            synthetics,
        }
    }

    /// Records a transaction event and returns whether it was retained by either aggregator.
    pub fn record(&self, event: TransactionEvent) -> bool {
        let event = if event.synthetics_resource_id.is_some() {
            match self.synthetics.offer(event) {
                Ok(()) => return true,
                Err(event) => event,
            }
        } else {
            event
        };

        let priority = event.priority;
        self.inner.record(event, Some(priority))
    }

    /// Returns the underlying aggregator.
    pub fn aggregator(&self) -> &Arc<EventAggregator<PriorityReservoir<TransactionEvent>>> {
        &self.inner
    }
}
