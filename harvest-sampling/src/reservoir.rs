use serde::Serialize;

use crate::sample::Sample;

/// An event removed from a reservoir together with the priority it was admitted with.
///
/// Keeping the priority allows a harvested but unsent event to be re-admitted with the same
/// standing it originally had.
#[derive(Clone, Debug, PartialEq)]
pub struct Retained<T> {
    /// The event payload.
    pub event: T,
    /// The admission priority, if the reservoir is priority based.
    pub priority: Option<f64>,
}

impl<T> Retained<T> {
    /// Wraps an event without a priority.
    pub fn new(event: T) -> Self {
        Self {
            event,
            priority: None,
        }
    }
}

/// A snapshot of a reservoir's occupancy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct ReservoirMetadata {
    /// The maximum number of retained events.
    pub capacity: usize,
    /// The number of currently retained events.
    pub captured: usize,
    /// The number of events offered since the last reset.
    pub seen: u64,
}

/// Arrival counters of a reservoir.
///
/// `num_seen` covers the current window and is cleared by [`Counters::reset`]. The lifetime
/// counters survive resets. They are only reduced through
/// [`Reservoir::decrement_lifetime_counts_by`] and cleared by [`Counters::reset_lifetime`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    /// Events offered since the last reset.
    pub num_seen: u64,
    /// Events offered over the lifetime of the reservoir.
    pub seen_lifetime: u64,
    /// Events that grew the retained set over the lifetime of the reservoir.
    pub captured_lifetime: u64,
}

impl Counters {
    /// Counts one offered event.
    pub fn incr_seen(&mut self) {
        self.num_seen += 1;
        self.seen_lifetime += 1;
    }

    /// Counts one event that grew the retained set.
    pub fn incr_captured(&mut self) {
        self.captured_lifetime += 1;
    }

    /// Clears the window counters.
    pub fn reset(&mut self) {
        self.num_seen = 0;
    }

    /// Clears the lifetime counters.
    pub fn reset_lifetime(&mut self) {
        self.seen_lifetime = 0;
        self.captured_lifetime = 0;
    }
}

mod private {
    pub trait Sealed {}
}

pub(crate) use self::private::Sealed;

/// A fixed capacity container deciding which offered events are retained.
///
/// Implemented by [`UniformSampledBuffer`](crate::UniformSampledBuffer),
/// [`PriorityReservoir`](crate::PriorityReservoir) and [`SizedBuffer`](crate::SizedBuffer).
/// Reservoirs are not synchronized, the owning aggregator serializes all access.
pub trait Reservoir: Sealed {
    /// The event type retained by this reservoir.
    type Item;

    /// Creates an empty reservoir.
    fn with_capacity(capacity: usize) -> Self
    where
        Self: Sized;

    /// Returns the maximum number of retained events.
    fn capacity(&self) -> usize;

    /// Returns the number of currently retained events.
    fn len(&self) -> usize;

    /// Offers an event and returns whether it was retained.
    ///
    /// `priority` is only used by priority based reservoirs. If the event is a
    /// [`Sample::Lazy`] producer, it is only invoked when the event is retained. A failing
    /// producer still counts as seen, but no event is stored and its error is returned.
    fn try_admit<F, E>(
        &mut self,
        sample: Sample<Self::Item, F>,
        priority: Option<f64>,
    ) -> Result<bool, E>
    where
        F: FnOnce() -> Result<Self::Item, E>;

    /// Changes the capacity.
    ///
    /// Growing keeps all retained events. Shrinking discards events down to the new capacity
    /// according to the reservoir's retention policy. The window counters are unchanged.
    fn resize(&mut self, capacity: usize);

    /// Removes and returns all retained events, leaving the counters untouched.
    fn drain(&mut self) -> Vec<Retained<Self::Item>>;

    /// Returns an iterator over the retained events.
    fn events(&self) -> impl Iterator<Item = &Self::Item>;

    /// Returns the arrival counters.
    fn counters(&self) -> &Counters;

    /// Returns the arrival counters for modification.
    fn counters_mut(&mut self) -> &mut Counters;

    /// Offers a precomputed event and returns whether it was retained.
    fn admit(&mut self, event: Self::Item, priority: Option<f64>) -> bool {
        let sample = Sample::<_, fn() -> Result<Self::Item, std::convert::Infallible>>::Value(event);
        let Ok(kept) = self.try_admit(sample, priority);
        kept
    }

    /// Offers an event built by `producer` and returns whether it was retained.
    ///
    /// `producer` is not invoked if the event is discarded.
    fn admit_with(&mut self, producer: impl FnOnce() -> Self::Item, priority: Option<f64>) -> bool {
        let sample = Sample::Lazy(|| Ok::<_, std::convert::Infallible>(producer()));
        let Ok(kept) = self.try_admit(sample, priority);
        kept
    }

    /// Removes all retained events and clears the window counters.
    fn reset(&mut self) {
        self.drain();
        self.counters_mut().reset();
    }

    /// Returns `true` if no events are retained.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the reservoir holds as many events as its capacity.
    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Returns the number of events offered since the last reset.
    fn num_seen(&self) -> u64 {
        self.counters().num_seen
    }

    /// Returns the number of offered events past the point the reservoir was full.
    ///
    /// This counts every arrival beyond the capacity, whether or not it displaced a retained
    /// event.
    fn num_dropped(&self) -> u64 {
        let seen = self.num_seen();
        seen - seen.min(self.capacity() as u64)
    }

    /// Returns the events offered over the lifetime of the reservoir.
    fn seen_lifetime(&self) -> u64 {
        self.counters().seen_lifetime
    }

    /// Returns the events that grew the retained set over the lifetime of the reservoir.
    fn captured_lifetime(&self) -> u64 {
        self.counters().captured_lifetime
    }

    /// Returns the fraction of offered events currently retained.
    fn sample_rate(&self) -> f64 {
        ratio(self.len() as u64, self.num_seen())
    }

    /// Returns the fraction of offered events retained over the lifetime of the reservoir.
    fn sample_rate_lifetime(&self) -> f64 {
        ratio(self.captured_lifetime(), self.seen_lifetime())
    }

    /// Reduces both lifetime counters by `count`.
    ///
    /// Used before re-admitting previously harvested events, so they are not counted twice.
    fn decrement_lifetime_counts_by(&mut self, count: u64) {
        let counters = self.counters_mut();
        counters.seen_lifetime = counters.seen_lifetime.saturating_sub(count);
        counters.captured_lifetime = counters.captured_lifetime.saturating_sub(count);
    }

    /// Clears the lifetime counters, keeping retained events and the window counters.
    fn reset_lifetime(&mut self) {
        self.counters_mut().reset_lifetime();
    }

    /// Returns a snapshot of the reservoir's occupancy.
    fn metadata(&self) -> ReservoirMetadata {
        ReservoirMetadata {
            capacity: self.capacity(),
            captured: self.len(),
            seen: self.num_seen(),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
