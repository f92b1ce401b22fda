//! Event aggregation and the periodic harvest of telemetry events.
//!
//! Every event type of the agent is collected by its own [`EventAggregator`], which wraps a
//! bounded [`Reservoir`](harvest_sampling::Reservoir) behind a mutex. Instrumented code records
//! events from any thread, and a single [`Harvester`] periodically drains all aggregators and
//! hands the events to a [`Transport`].
//!
//! # Lifecycle
//!
//! ```text
//! record ──▶ reservoir ──harvest──▶ transport ──ok──▶ done
//!                ▲                      │
//!                └───────merge──────────┘ (retryable failure)
//! ```
//!
//! A harvest returns the retained events together with [`HarvestMetadata`] and starts a new
//! window. If sending fails with a retryable error, the harvest is merged back into the aggregator
//! where its events compete with the events recorded in the meantime.
//!
//! # Example
//!
//! ```
//! use harvest_aggregator::{ErrorEvent, ErrorEventAggregator};
//! use harvest_config::LiveConfig;
//!
//! let errors = ErrorEventAggregator::new(LiveConfig::default());
//! errors.record(ErrorEvent::new("RuntimeError", "something broke"));
//!
//! let harvest = errors.aggregator().harvest();
//! assert_eq!(harvest.len(), 1);
//! assert_eq!(harvest.metadata().events_seen, 1);
//! ```
//!
//! # Supportability Metrics
//!
//! On every harvest, each aggregator reports how many events it saw, sent and dropped during the
//! window through [`harvest_statsd`]. The metric names are listed in [`statsd`].
#![warn(missing_docs)]

mod aggregator;
mod events;
mod harvest;
mod harvester;
pub mod statsd;

pub use self::aggregator::*;
pub use self::events::*;
pub use self::harvest::*;
pub use self::harvester::*;
