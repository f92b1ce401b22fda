use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

use harvest_config::{EventType, LiveConfig};
use harvest_log::LogError;
use harvest_sampling::{Reservoir, ReservoirMetadata, Retained, Sample};
use harvest_statsd::metric;
use parking_lot::Mutex;

use crate::harvest::{Harvest, HarvestMetadata};
use crate::statsd::{EventCounters, EventGauges};

/// An event producer did not return an event.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// The producer returned an error.
    #[error("event producer failed")]
    Failed(#[source] Box<dyn Error + Send + Sync>),
    /// The producer panicked.
    #[error("event producer panicked: {0}")]
    Panicked(String),
}

impl ProducerError {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_owned()
        };

        Self::Panicked(message)
    }
}

#[derive(Debug)]
struct Inner<R> {
    reservoir: R,
    /// Set once the reservoir filled up during the current window.
    full: bool,
}

/// Coordinates recording, harvesting and merging of one event type.
///
/// The aggregator exclusively owns a [`Reservoir`] and serializes all access to it through a
/// single mutex. It is created once per event type, shared between all recording threads and
/// the harvester, and lives for the rest of the process.
///
/// # Configuration
///
/// The `enabled` flag of the event type is read from the [`LiveConfig`] on every record. The
/// capacity is only read when harvesting: if it changed, the reservoir is resized right after it
/// was drained, so an ongoing window is never interrupted.
///
/// # Failures
///
/// No operation fails for over capacity conditions, dropping events is the steady state under
/// load. Producers that fail or panic are logged and counted. Their event still counts as seen,
/// but nothing is retained.
#[derive(Debug)]
pub struct EventAggregator<R> {
    event_type: EventType,
    config: LiveConfig,
    inner: Mutex<Inner<R>>,
}

impl<R: Reservoir> EventAggregator<R> {
    /// Creates an aggregator with the currently configured capacity.
    pub fn new(event_type: EventType, config: LiveConfig) -> Self {
        let capacity = config.load().events.capacity(event_type);
        Self::with_reservoir(event_type, config, R::with_capacity(capacity))
    }

    /// Creates an aggregator around an existing reservoir.
    pub fn with_reservoir(event_type: EventType, config: LiveConfig, reservoir: R) -> Self {
        Self {
            event_type,
            config,
            inner: Mutex::new(Inner {
                reservoir,
                full: false,
            }),
        }
    }

    /// Returns the event type of this aggregator.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns `true` if events of this type are currently recorded.
    pub fn is_enabled(&self) -> bool {
        self.config.load().events.enabled(self.event_type)
    }

    /// Records an event and returns whether it was retained.
    ///
    /// This is a no-op if the event type is disabled. `priority` is only used by priority based
    /// reservoirs, which draw a random priority if none is given.
    pub fn record(&self, event: R::Item, priority: Option<f64>) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let sample = Sample::<_, fn() -> Result<R::Item, ProducerError>>::Value(event);
        self.admit_or_report(sample, priority)
    }

    /// Records an event built by `producer` and returns whether it was retained.
    ///
    /// The producer is only invoked if the event is retained. It runs while the aggregator is
    /// locked and must not block. If it panics, the panic is caught and reported.
    ///
    /// The process panic hook still runs before the panic is caught, and the default hook prints
    /// to stderr. Hosts that want producer panics reported through logging only should install
    /// their own hook with [`std::panic::set_hook`].
    pub fn record_with<F>(&self, producer: F, priority: Option<f64>) -> bool
    where
        F: FnOnce() -> R::Item,
    {
        self.try_record_with(|| Ok::<_, ProducerError>(producer()), priority)
    }

    /// Records an event built by a fallible `producer` and returns whether it was retained.
    ///
    /// Errors and panics of the producer are logged and counted, but never returned.
    pub fn try_record_with<F, E>(&self, producer: F, priority: Option<f64>) -> bool
    where
        F: FnOnce() -> Result<R::Item, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        if !self.is_enabled() {
            return false;
        }

        let sample = Sample::Lazy(|| match panic::catch_unwind(AssertUnwindSafe(producer)) {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(error)) => Err(ProducerError::Failed(error.into())),
            Err(payload) => Err(ProducerError::from_panic(payload)),
        });
        self.admit_or_report(sample, priority)
    }

    /// Records an event, returning it back if it was not retained.
    ///
    /// Used to offer an event to a more specific aggregator before it competes in a general one.
    pub fn record_or_return(&self, event: R::Item, priority: Option<f64>) -> Result<(), R::Item> {
        if !self.is_enabled() {
            return Err(event);
        }

        let mut slot = Some(event);
        // The producer runs at most once, so the slot is always filled when it does.
        let _ = self.admit(Sample::Lazy(|| slot.take().ok_or(())), priority);

        match slot {
            Some(event) => Err(event),
            None => Ok(()),
        }
    }

    /// Drains all retained events and starts a new window.
    ///
    /// The returned metadata holds the capacity under which the events were collected and the
    /// number of events offered during the window. The window counters are reset, the lifetime
    /// counters are kept. If the configured capacity changed, the reservoir is resized now.
    ///
    /// Harvesting works the same when the event type is disabled.
    pub fn harvest(&self) -> Harvest<R::Item> {
        let capacity = self.config.load().events.capacity(self.event_type);

        let harvest = {
            let mut inner = self.inner.lock();
            let metadata = HarvestMetadata {
                reservoir_size: inner.reservoir.capacity(),
                events_seen: inner.reservoir.num_seen(),
            };

            let entries = inner.reservoir.drain();
            inner.reservoir.counters_mut().reset();
            inner.full = false;

            if inner.reservoir.capacity() != capacity {
                harvest_log::debug!(
                    event_type = self.event_type.as_str(),
                    "resizing {} reservoir from {} to {capacity}",
                    self.event_type,
                    inner.reservoir.capacity(),
                );
                inner.reservoir.resize(capacity);
            }

            Harvest::new(metadata, entries)
        };

        self.report(&harvest);
        harvest
    }

    /// Re-admits the events of an unsent harvest.
    ///
    /// Each event counts as one new arrival and competes with the events recorded since, under
    /// the current capacity. Lifetime counters are first reduced by the number of merged events,
    /// so they are not counted twice.
    pub fn merge(&self, harvest: Harvest<R::Item>) {
        let (_, entries) = harvest.into_parts();
        let count = entries.len();
        if count == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        inner.reservoir.decrement_lifetime_counts_by(count as u64);
        for Retained { event, priority } in entries {
            inner.reservoir.admit(event, priority);
        }

        let notify = self.check_full(&mut inner);
        drop(inner);

        harvest_log::trace!("merged {count} {} events", self.event_type);
        if let Some(capacity) = notify {
            self.notify_full(capacity);
        }
    }

    /// Clears all retained events and the window counters.
    ///
    /// Configuration and lifetime counters are kept.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.reservoir.reset();
        inner.full = false;
    }

    /// Clears the lifetime counters.
    ///
    /// Retained events and the current window are kept.
    pub fn reset_lifetime(&self) {
        self.inner.lock().reservoir.reset_lifetime();
    }

    /// Returns a snapshot of the reservoir's occupancy.
    pub fn metadata(&self) -> ReservoirMetadata {
        self.inner.lock().reservoir.metadata()
    }

    /// Returns the number of currently retained events.
    pub fn len(&self) -> usize {
        self.inner.lock().reservoir.len()
    }

    /// Returns `true` if no events are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the events offered over the lifetime of the aggregator.
    pub fn seen_lifetime(&self) -> u64 {
        self.inner.lock().reservoir.seen_lifetime()
    }

    /// Returns the events that grew the retained set over the lifetime of the aggregator.
    pub fn captured_lifetime(&self) -> u64 {
        self.inner.lock().reservoir.captured_lifetime()
    }

    /// Returns the fraction of offered events retained over the lifetime of the aggregator.
    pub fn sample_rate_lifetime(&self) -> f64 {
        self.inner.lock().reservoir.sample_rate_lifetime()
    }

    fn admit<F, E>(&self, sample: Sample<R::Item, F>, priority: Option<f64>) -> Result<bool, E>
    where
        F: FnOnce() -> Result<R::Item, E>,
    {
        let mut inner = self.inner.lock();
        let result = inner.reservoir.try_admit(sample, priority);
        let notify = self.check_full(&mut inner);
        drop(inner);

        if let Some(capacity) = notify {
            self.notify_full(capacity);
        }
        result
    }

    fn admit_or_report<F>(&self, sample: Sample<R::Item, F>, priority: Option<f64>) -> bool
    where
        F: FnOnce() -> Result<R::Item, ProducerError>,
    {
        match self.admit(sample, priority) {
            Ok(kept) => kept,
            Err(error) => {
                harvest_log::warn!(
                    event_type = self.event_type.as_str(),
                    "dropping {} event: {}",
                    self.event_type,
                    LogError(&error),
                );
                metric!(counter(EventCounters::ProducerFailed(self.event_type)) += 1);
                false
            }
        }
    }

    /// Returns the capacity if the reservoir became full for the first time in this window.
    fn check_full(&self, inner: &mut Inner<R>) -> Option<usize> {
        if inner.full || !inner.reservoir.is_full() {
            return None;
        }

        inner.full = true;
        Some(inner.reservoir.capacity())
    }

    fn notify_full(&self, capacity: usize) {
        harvest_log::debug!(
            event_type = self.event_type.as_str(),
            "{} capacity of {capacity} reached, sampling further events",
            self.event_type.category(),
        );
    }

    fn report(&self, harvest: &Harvest<R::Item>) {
        let metadata = harvest.metadata();
        let sent = harvest.len() as u64;
        let event_type = self.event_type;

        metric!(counter(EventCounters::Seen(event_type)) += metadata.events_seen);
        metric!(counter(EventCounters::Sent(event_type)) += sent);
        metric!(
            counter(EventCounters::Dropped(event_type)) += metadata.events_seen.saturating_sub(sent)
        );
        metric!(
            gauge(EventGauges::ReservoirSize) = metadata.reservoir_size as u64,
            event_type = event_type.as_str(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use harvest_config::{CapacitySetting, Config};
    use harvest_sampling::{PriorityReservoir, ScriptedSource, UniformSampledBuffer};
    use similar_asserts::assert_eq;

    use super::*;

    fn config_with_capacity(event_type: EventType, capacity: usize) -> LiveConfig {
        let mut config = Config::default();
        config.events.get_mut(event_type).max_samples_stored = CapacitySetting::Value(capacity);
        LiveConfig::new(config)
    }

    fn uniform(capacity: usize) -> EventAggregator<UniformSampledBuffer<u32>> {
        EventAggregator::new(
            EventType::Transaction,
            config_with_capacity(EventType::Transaction, capacity),
        )
    }

    fn priority(capacity: usize) -> EventAggregator<PriorityReservoir<&'static str>> {
        EventAggregator::new(EventType::Error, config_with_capacity(EventType::Error, capacity))
    }

    #[test]
    fn test_harvest_priority() {
        let aggregator = priority(1);
        aggregator.record("Deadly", Some(0.5));
        aggregator.record("Buggy", Some(0.9));

        let harvest = aggregator.harvest();
        insta::assert_debug_snapshot!(harvest.metadata(), @r"
        HarvestMetadata {
            reservoir_size: 1,
            events_seen: 2,
        }
        ");
        assert_eq!(harvest.into_events(), vec!["Buggy"]);
    }

    #[test]
    fn test_harvest_starts_new_window() {
        let aggregator = uniform(5);
        for i in 0..7 {
            aggregator.record(i, None);
        }

        let harvest = aggregator.harvest();
        assert_eq!(harvest.len(), 5);
        assert_eq!(harvest.metadata().events_seen, 7);

        assert!(aggregator.is_empty());
        assert_eq!(
            aggregator.metadata(),
            ReservoirMetadata {
                capacity: 5,
                captured: 0,
                seen: 0
            }
        );
        assert_eq!(aggregator.seen_lifetime(), 7);
        assert_eq!(aggregator.captured_lifetime(), 5);
    }

    #[test]
    fn test_harvest_reports_supportability() {
        let aggregator = uniform(5);
        for i in 0..7 {
            aggregator.record(i, None);
        }

        let captures = harvest_statsd::with_capturing_test_client(|| {
            aggregator.harvest();
        });

        assert_eq!(
            captures,
            [
                "TransactionEvent/Seen:7|c",
                "TransactionEvent/Sent:5|c",
                "TransactionEvent/Dropped:2|c",
                "Supportability/Harvest/ReservoirSize:5|g|#event_type:transaction",
            ]
        );
    }

    #[test]
    fn test_disabled_is_noop() {
        let config = LiveConfig::default();
        config.update(|c| c.events.error.enabled = false);
        let aggregator = EventAggregator::<PriorityReservoir<u32>>::new(EventType::Error, config);

        let calls = Cell::new(0);
        assert!(!aggregator.record(1, None));
        assert!(!aggregator.record_with(
            || {
                calls.set(calls.get() + 1);
                2
            },
            None
        ));

        assert_eq!(calls.get(), 0);
        assert_eq!(aggregator.metadata().seen, 0);

        let harvest = aggregator.harvest();
        assert!(harvest.is_empty());
        assert_eq!(harvest.metadata().reservoir_size, 100);
    }

    #[test]
    fn test_enabled_is_read_on_record() {
        let config = LiveConfig::default();
        let aggregator = EventAggregator::<PriorityReservoir<u32>>::new(EventType::Custom, config.clone());

        assert!(aggregator.record(1, None));
        config.update(|c| c.events.custom.enabled = false);
        assert!(!aggregator.record(2, None));
        config.update(|c| c.events.custom.enabled = true);
        assert!(aggregator.record(3, None));

        assert_eq!(aggregator.len(), 2);
    }

    #[test]
    fn test_capacity_change_applies_at_harvest() {
        let config = config_with_capacity(EventType::Transaction, 10);
        let aggregator = EventAggregator::<UniformSampledBuffer<u32>>::new(
            EventType::Transaction,
            config.clone(),
        );
        for i in 0..10 {
            aggregator.record(i, None);
        }

        config.update(|c| c.events.transaction.max_samples_stored = CapacitySetting::Value(3));
        assert_eq!(aggregator.len(), 10);

        let harvest = aggregator.harvest();
        assert_eq!(harvest.len(), 10);
        assert_eq!(harvest.metadata().reservoir_size, 10);
        assert_eq!(aggregator.metadata().capacity, 3);

        for i in 0..10 {
            aggregator.record(i, None);
        }
        assert_eq!(aggregator.len(), 3);
    }

    #[test]
    fn test_merge_respects_capacity() {
        let aggregator = uniform(10);
        for i in 0..8 {
            aggregator.record(i, None);
        }
        let harvest = aggregator.harvest();

        for i in 100..105 {
            aggregator.record(i, None);
        }
        aggregator.merge(harvest);

        let harvest = aggregator.harvest();
        assert_eq!(harvest.len(), 10);
        assert_eq!(harvest.metadata().events_seen, 13);
    }

    #[test]
    fn test_merge_keeps_priorities() {
        let aggregator = priority(2);
        aggregator.record("low", Some(0.1));
        aggregator.record("high", Some(0.9));
        let harvest = aggregator.harvest();

        aggregator.record("medium", Some(0.5));
        aggregator.merge(harvest);

        let mut events = aggregator.harvest().into_events();
        events.sort();
        assert_eq!(events, vec!["high", "medium"]);
    }

    #[test]
    fn test_merge_does_not_double_count_lifetime() {
        let aggregator = uniform(10);
        for i in 0..4 {
            aggregator.record(i, None);
        }
        let harvest = aggregator.harvest();
        aggregator.merge(harvest);

        assert_eq!(aggregator.seen_lifetime(), 4);
        assert_eq!(aggregator.captured_lifetime(), 4);
        assert_eq!(aggregator.sample_rate_lifetime(), 1.0);
    }

    #[test]
    fn test_failed_producer_is_reported() {
        harvest_test::setup();

        let aggregator = priority(5);
        aggregator.record("kept", None);

        let captures = harvest_statsd::with_capturing_test_client(|| {
            assert!(!aggregator.try_record_with(|| Err("missing payload"), None));
        });

        assert_eq!(captures, ["ErrorEvent/ProducerFailed:1|c"]);
        assert_eq!(aggregator.metadata().seen, 2);
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_panicking_producer_is_contained() {
        harvest_test::setup();

        let aggregator = priority(5);
        assert!(!aggregator.record_with(|| panic!("boom"), None));

        // The lock is not poisoned and the aggregator keeps working.
        assert!(aggregator.record("after", None));
        assert_eq!(aggregator.metadata().seen, 2);
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_failed_producers_count_as_seen() {
        harvest_test::setup();

        let aggregator = uniform(5);
        aggregator.record(1, None);
        assert!(!aggregator.try_record_with(|| Err("missing payload"), None));
        assert!(!aggregator.record_with(|| panic!("boom"), None));

        let captures = harvest_statsd::with_capturing_test_client(|| {
            let harvest = aggregator.harvest();
            assert_eq!(harvest.len(), 1);
            assert_eq!(harvest.metadata().events_seen, 3);
        });

        assert_eq!(
            captures,
            [
                "TransactionEvent/Seen:3|c",
                "TransactionEvent/Sent:1|c",
                "TransactionEvent/Dropped:2|c",
                "Supportability/Harvest/ReservoirSize:5|g|#event_type:transaction",
            ]
        );
        assert_eq!(aggregator.seen_lifetime(), 3);
        assert_eq!(aggregator.captured_lifetime(), 1);
    }

    #[test]
    fn test_full_notification_once_per_window() {
        let aggregator = uniform(2);
        let is_full = || aggregator.inner.lock().full;

        aggregator.record(0, None);
        assert!(!is_full());
        aggregator.record(1, None);
        assert!(is_full());

        // Further records in the same window do not notify again.
        aggregator.record(2, None);
        assert_eq!(aggregator.check_full(&mut aggregator.inner.lock()), None);

        aggregator.harvest();
        assert!(!is_full());
        aggregator.record(3, None);
        assert!(!is_full());
        aggregator.record(4, None);
        assert!(is_full());

        aggregator.reset();
        assert!(!is_full());

        // A fresh window notifies exactly once when it fills up.
        let mut inner = aggregator.inner.lock();
        inner.reservoir.admit(5, None);
        inner.reservoir.admit(6, None);
        assert_eq!(aggregator.check_full(&mut inner), Some(2));
        assert_eq!(aggregator.check_full(&mut inner), None);
    }

    #[test]
    fn test_reset_lifetime() {
        let aggregator = uniform(3);
        for i in 0..5 {
            aggregator.record(i, None);
        }

        aggregator.reset_lifetime();
        assert_eq!(aggregator.seen_lifetime(), 0);
        assert_eq!(aggregator.captured_lifetime(), 0);
        assert_eq!(aggregator.len(), 3);
        assert_eq!(aggregator.metadata().seen, 5);
    }

    #[test]
    fn test_producer_not_invoked_on_discard() {
        let reservoir = UniformSampledBuffer::with_random(1, ScriptedSource::with_indexes([1]));
        let aggregator = EventAggregator::with_reservoir(
            EventType::Transaction,
            LiveConfig::default(),
            reservoir,
        );
        aggregator.record(0u32, None);

        let calls = Cell::new(0);
        let kept = aggregator.record_with(
            || {
                calls.set(calls.get() + 1);
                1
            },
            None,
        );

        assert!(!kept);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_record_or_return() {
        let aggregator = priority(1);
        assert_eq!(aggregator.record_or_return("first", Some(0.5)), Ok(()));
        assert_eq!(aggregator.record_or_return("second", Some(0.1)), Err("second"));
        assert_eq!(aggregator.metadata().seen, 2);
    }

    #[test]
    fn test_reset() {
        let aggregator = uniform(3);
        for i in 0..5 {
            aggregator.record(i, None);
        }

        aggregator.reset();
        assert!(aggregator.is_empty());
        assert_eq!(aggregator.metadata().seen, 0);
        assert_eq!(aggregator.seen_lifetime(), 5);
    }
}
