//! Bounded containers that decide which telemetry events survive when events arrive faster than
//! they can be retained.
//!
//! Instrumented code produces events continuously, but only a fixed number per harvest window is
//! kept in memory. Every container in this crate implements the [`Reservoir`] trait and differs
//! only in its retention policy:
//!
//! - [`UniformSampledBuffer`]: a uniform random sample of all arrivals (Algorithm R). After `n`
//!   arrivals every arrival is retained with probability `capacity / n`.
//! - [`PriorityReservoir`]: the `capacity` highest priority arrivals, built on [`PriorityHeap`].
//! - [`SizedBuffer`]: the first `capacity` arrivals of a window.
//!
//! # Counting
//!
//! Reservoirs count every offered event, whether retained or not. `num_seen` covers the current
//! window and is cleared by [`Reservoir::reset`], while the lifetime counters persist across
//! windows for long running sample rate reporting. [`Reservoir::num_dropped`] is a coarse
//! supportability figure: every arrival past the point the reservoir was full counts as dropped,
//! even if it displaced a retained event.
//!
//! # Deferred Construction
//!
//! Events can be offered as a [`Sample::Lazy`] producer. The producer only runs when the
//! admission decision keeps the event, so expensive payloads are never built just to be thrown
//! away:
//!
//! ```
//! use harvest_sampling::{Reservoir, UniformSampledBuffer};
//!
//! let mut buffer = UniformSampledBuffer::<String>::with_capacity(2);
//! for i in 0..10 {
//!     buffer.append_with(|| format!("event {i}"));
//! }
//!
//! assert_eq!(buffer.len(), 2);
//! assert_eq!(buffer.num_seen(), 10);
//! assert_eq!(buffer.num_dropped(), 8);
//! ```
//!
//! # Priorities
//!
//! Priority reservoirs favor interesting events. Use [`priority_for`] to rank events of sampled
//! work above all other events while keeping retention random within each group:
//!
//! ```
//! use harvest_sampling::{priority_for, PriorityReservoir, Reservoir};
//!
//! let mut reservoir = PriorityReservoir::<&str>::with_capacity(1);
//! reservoir.record("sampled", priority_for(true));
//! reservoir.record("unsampled", priority_for(false));
//!
//! assert_eq!(reservoir.events().collect::<Vec<_>>(), [&"sampled"]);
//! ```
#![warn(missing_docs)]

mod heap;
mod priority;
mod random;
mod reservoir;
mod sample;
mod sized;
mod uniform;

pub use self::heap::*;
pub use self::priority::*;
pub use self::random::*;
pub use self::reservoir::{Counters, Reservoir, ReservoirMetadata, Retained};
pub use self::sample::*;
pub use self::sized::*;
pub use self::uniform::*;
