use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harvest_config::{EventType, LiveConfig};
use harvest_log::LogError;
use harvest_sampling::Reservoir;
use harvest_statsd::metric;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::EventAggregator;
use crate::harvest::Harvest;
use crate::statsd::HarvestCounters;

/// Sending a harvest failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The collector could not be reached.
    #[error("could not reach the collector")]
    Unavailable(#[source] Box<dyn Error + Send + Sync>),
    /// The collector responded with an unsuccessful status code.
    #[error("collector responded with status {0}")]
    Status(u16),
    /// The collector refused the payload and will refuse it again.
    #[error("collector rejected the payload: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Returns `true` if sending the same harvest later may succeed.
    ///
    /// Events of retryable failures are merged back into their aggregator.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Status(status) => matches!(status, 408 | 429 | 500..=599),
            Self::Rejected(_) => false,
        }
    }
}

/// Delivers harvested events to the collector.
#[async_trait]
pub trait Transport<E>: Send + Sync {
    /// Sends one harvest of an event type.
    async fn send(&self, event_type: EventType, harvest: &Harvest<E>)
    -> Result<(), TransportError>;
}

/// One unit of periodic work of the [`Harvester`].
#[async_trait]
pub trait HarvestCycle: Send + Sync {
    /// Returns the event type this cycle harvests.
    fn event_type(&self) -> EventType;

    /// Harvests and sends once.
    async fn run(&self);
}

/// Binds an [`EventAggregator`] to a [`Transport`].
///
/// Each run harvests the aggregator and sends non-empty harvests. After a retryable failure the
/// events are merged back so they get another chance in the next cycle, other failures drop the
/// batch.
pub struct AggregatorCycle<R: Reservoir, T> {
    aggregator: Arc<EventAggregator<R>>,
    transport: Arc<T>,
}

impl<R: Reservoir, T> AggregatorCycle<R, T> {
    /// Creates a cycle sending the events of `aggregator` through `transport`.
    pub fn new(aggregator: Arc<EventAggregator<R>>, transport: Arc<T>) -> Self {
        Self {
            aggregator,
            transport,
        }
    }
}

impl<R: Reservoir, T> fmt::Debug for AggregatorCycle<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorCycle")
            .field("event_type", &self.aggregator.event_type())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R, T> HarvestCycle for AggregatorCycle<R, T>
where
    R: Reservoir + Send + 'static,
    R::Item: Send + Sync,
    T: Transport<R::Item> + 'static,
{
    fn event_type(&self) -> EventType {
        self.aggregator.event_type()
    }

    async fn run(&self) {
        let event_type = self.aggregator.event_type();
        let harvest = self.aggregator.harvest();
        if harvest.is_empty() {
            harvest_log::trace!("no {event_type} events to send");
            return;
        }

        let count = harvest.len();
        match self.transport.send(event_type, &harvest).await {
            Ok(()) => harvest_log::debug!("sent {count} {event_type} events"),
            Err(error) if error.retryable() => {
                harvest_log::warn!(
                    "failed to send {count} {event_type} events, retrying next cycle: {}",
                    LogError(&error)
                );
                metric!(
                    counter(HarvestCounters::Merged) += count as u64,
                    event_type = event_type.as_str(),
                );
                self.aggregator.merge(harvest);
            }
            Err(error) => {
                harvest_log::warn!(
                    "dropping {count} {event_type} events: {}",
                    LogError(&error)
                );
                metric!(
                    counter(HarvestCounters::Discarded) += count as u64,
                    event_type = event_type.as_str(),
                );
            }
        }
    }
}

/// Periodically runs all registered [`HarvestCycle`]s.
///
/// All cycles share one interval. On shutdown, one final round of cycles runs so events recorded
/// since the last harvest are not lost.
#[derive(Default)]
pub struct Harvester {
    cycles: Vec<Box<dyn HarvestCycle>>,
    interval: Duration,
}

impl Harvester {
    /// Creates a harvester with the configured interval.
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            cycles: Vec::new(),
            interval: config.load().harvest.interval(),
        }
    }

    /// Adds a cycle.
    pub fn register(&mut self, cycle: impl HarvestCycle + 'static) {
        self.cycles.push(Box::new(cycle));
    }

    /// Adds a cycle sending the events of `aggregator` through `transport`.
    pub fn register_aggregator<R, T>(
        &mut self,
        aggregator: Arc<EventAggregator<R>>,
        transport: Arc<T>,
    ) where
        R: Reservoir + Send + 'static,
        R::Item: Send + Sync,
        T: Transport<R::Item> + 'static,
    {
        self.register(AggregatorCycle::new(aggregator, transport));
    }

    /// Returns the interval between two rounds.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs every cycle once, in registration order.
    pub async fn run_once(&self) {
        for cycle in &self.cycles {
            cycle.run().await;
        }
    }

    /// Runs cycles every interval until `shutdown` changes or its sender is dropped.
    ///
    /// The first round runs one interval after the start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        harvest_log::info!(
            "harvesting {} event types every {}s",
            self.cycles.len(),
            period.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once().await,
                _ = shutdown.changed() => break,
            }
        }

        harvest_log::info!("harvester shutting down, sending remaining events");
        self.run_once().await;
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

impl fmt::Debug for Harvester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event_types: Vec<_> = self.cycles.iter().map(|c| c.event_type()).collect();
        f.debug_struct("Harvester")
            .field("event_types", &event_types)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use harvest_config::{CapacitySetting, Config};
    use harvest_sampling::PriorityReservoir;
    use parking_lot::Mutex;
    use similar_asserts::assert_eq;

    use super::*;

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<Vec<u32>>>,
        failures: Mutex<VecDeque<TransportError>>,
    }

    impl MockTransport {
        fn failing(failures: impl IntoIterator<Item = TransportError>) -> Self {
            Self {
                sent: Mutex::default(),
                failures: Mutex::new(failures.into_iter().collect()),
            }
        }

        fn sent(&self) -> Vec<Vec<u32>> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport<u32> for MockTransport {
        async fn send(
            &self,
            _event_type: EventType,
            harvest: &Harvest<u32>,
        ) -> Result<(), TransportError> {
            if let Some(error) = self.failures.lock().pop_front() {
                return Err(error);
            }

            let mut events: Vec<_> = harvest.events().copied().collect();
            events.sort();
            self.sent.lock().push(events);
            Ok(())
        }
    }

    fn setup(
        transport: MockTransport,
    ) -> (
        LiveConfig,
        Arc<EventAggregator<PriorityReservoir<u32>>>,
        Arc<MockTransport>,
        Harvester,
    ) {
        let mut config = Config::default();
        config.events.error.max_samples_stored = CapacitySetting::Value(10);
        config.harvest.interval_secs = 60;
        let config = LiveConfig::new(config);

        let aggregator = Arc::new(EventAggregator::new(EventType::Error, config.clone()));
        let transport = Arc::new(transport);

        let mut harvester = Harvester::new(&config);
        harvester.register_aggregator(aggregator.clone(), transport.clone());

        (config, aggregator, transport, harvester)
    }

    #[test]
    fn test_retryable() {
        assert!(TransportError::Status(503).retryable());
        assert!(TransportError::Status(429).retryable());
        assert!(!TransportError::Status(413).retryable());
        assert!(!TransportError::Rejected("too large".to_owned()).retryable());
        assert!(TransportError::Unavailable("connection refused".into()).retryable());
    }

    #[tokio::test]
    async fn test_cycle_sends() {
        let (_, aggregator, transport, harvester) = setup(MockTransport::default());
        aggregator.record(1, None);
        aggregator.record(2, None);

        harvester.run_once().await;
        assert_eq!(transport.sent(), vec![vec![1, 2]]);
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_empty_harvest_is_not_sent() {
        let (_, _, transport, harvester) = setup(MockTransport::default());
        harvester.run_once().await;
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_retryable_failure_merges() {
        harvest_test::setup();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let transport = MockTransport::failing([TransportError::Status(503)]);
        let (_, aggregator, transport, harvester) = setup(transport);
        aggregator.record(1, None);

        // The capturing client is thread local, so the cycle runs on this thread.
        let captures = harvest_statsd::with_capturing_test_client(|| {
            runtime.block_on(harvester.run_once());
        });
        assert!(captures.contains(&"Supportability/Harvest/Merged:1|c|#event_type:error".to_owned()));
        assert_eq!(aggregator.len(), 1);

        aggregator.record(2, None);
        runtime.block_on(harvester.run_once());
        assert_eq!(transport.sent(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_rejected_failure_drops() {
        harvest_test::setup();

        let transport = MockTransport::failing([TransportError::Rejected("too large".to_owned())]);
        let (_, aggregator, transport, harvester) = setup(transport);
        aggregator.record(1, None);

        harvester.run_once().await;
        assert!(aggregator.is_empty());

        harvester.run_once().await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_and_final_harvest() {
        let (_, aggregator, transport, harvester) = setup(MockTransport::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = harvester.spawn(shutdown_rx);

        aggregator.record(1, None);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(transport.sent().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.sent(), vec![vec![1]]);

        aggregator.record(2, None);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.sent(), vec![vec![1], vec![2]]);
    }
}
