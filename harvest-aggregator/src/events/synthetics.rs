use std::sync::Arc;

use harvest_config::{EventType, LiveConfig};
use harvest_sampling::SizedBuffer;

use crate::aggregator::EventAggregator;
use crate::events::TransactionEvent;

/// Collects transaction events triggered by synthetic monitors.
///
/// Synthetic traffic is rare and always interesting, so the first events of each window are kept
/// without sampling. Events are normally offered through the
/// [`TransactionEventAggregator`](crate::TransactionEventAggregator).
#[derive(Debug)]
pub struct SyntheticsEventAggregator {
    inner: Arc<EventAggregator<SizedBuffer<TransactionEvent>>>,
}

impl SyntheticsEventAggregator {
    /// Creates the aggregator with the configured capacity.
    pub fn new(config: LiveConfig) -> Self {
        Self {
            inner: Arc::new(EventAggregator::new(EventType::Synthetics, config)),
        }
    }

    /// Records a synthetics event and returns whether it was retained.
    pub fn record(&self, event: TransactionEvent) -> bool {
        let priority = event.priority;
        self.inner.record(event, Some(priority))
    }

    /// Records a synthetics event, returning it back if there was no room for it.
    pub fn offer(&self, event: TransactionEvent) -> Result<(), TransactionEvent> {
        let priority = event.priority;
        self.inner.record_or_return(event, Some(priority))
    }

    /// Returns the underlying aggregator.
    pub fn aggregator(&self) -> &Arc<EventAggregator<SizedBuffer<TransactionEvent>>> {
        &self.inner
    }
}
