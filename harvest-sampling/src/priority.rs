use crate::heap::{HeapOrder, PriorityHeap};
use crate::random::{PcgSource, RandomSource};
use crate::reservoir::{Counters, Reservoir, Retained, Sealed};
use crate::sample::Sample;

#[derive(Clone, Debug)]
struct Entry<T> {
    event: T,
    priority: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct ByPriority;

impl<T> HeapOrder<Entry<T>> for ByPriority {
    fn less(&self, a: &Entry<T>, b: &Entry<T>) -> bool {
        a.priority < b.priority
    }
}

/// A fixed capacity reservoir retaining the highest priority events offered so far.
///
/// Events are kept in a min-heap keyed by priority, so the lowest retained priority is always at
/// the root. Once full, a new event replaces the root only if its priority is strictly greater.
/// Ties favor the events already retained.
///
/// Events offered without a priority draw one from the reservoir's random source, which makes
/// retention of unprioritized events unbiased. A `NaN` priority is treated as `0.0`.
#[derive(Clone, Debug)]
pub struct PriorityReservoir<T, R = PcgSource> {
    heap: PriorityHeap<Entry<T>, ByPriority>,
    capacity: usize,
    counters: Counters,
    random: R,
}

impl<T, R: RandomSource + Default> PriorityReservoir<T, R> {
    /// Creates an empty reservoir drawing missing priorities from the given random source.
    pub fn with_random(capacity: usize, random: R) -> Self {
        Self {
            heap: PriorityHeap::with_order(Vec::with_capacity(capacity), ByPriority),
            capacity,
            counters: Counters::default(),
            random,
        }
    }

    /// Offers an event with a priority and returns whether it was retained.
    pub fn record(&mut self, event: T, priority: f64) -> bool {
        self.admit(event, Some(priority))
    }

    /// Offers an event built by `producer`, which is only invoked if the event is retained.
    pub fn record_with(&mut self, producer: impl FnOnce() -> T, priority: f64) -> bool {
        self.admit_with(producer, Some(priority))
    }

    /// Returns the lowest retained priority.
    ///
    /// Once the reservoir is full, only events with a greater priority are admitted.
    pub fn min_priority(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.priority)
    }

    fn effective_priority(&mut self, priority: Option<f64>) -> f64 {
        match priority {
            Some(priority) if priority.is_nan() => 0.0,
            Some(priority) => priority,
            None => self.random.priority(),
        }
    }
}

impl<T, R> Sealed for PriorityReservoir<T, R> {}

impl<T, R: RandomSource + Default> Reservoir for PriorityReservoir<T, R> {
    type Item = T;

    fn with_capacity(capacity: usize) -> Self {
        Self::with_random(capacity, R::default())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn try_admit<F, E>(&mut self, sample: Sample<T, F>, priority: Option<f64>) -> Result<bool, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let priority = self.effective_priority(priority);
        self.counters.incr_seen();

        if self.heap.len() < self.capacity {
            let event = sample.resolve()?;
            self.heap.push(Entry { event, priority });
            self.counters.incr_captured();
            return Ok(true);
        }

        if self.min_priority().is_none_or(|min| priority <= min) {
            return Ok(false);
        }

        let event = sample.resolve()?;
        self.heap.set(0, Entry { event, priority });
        self.heap.fix(0);
        Ok(true)
    }

    fn resize(&mut self, capacity: usize) {
        if capacity < self.heap.len() {
            harvest_log::trace!(
                "shrinking priority reservoir from {} to {capacity} events",
                self.heap.len()
            );
        }

        while self.heap.len() > capacity {
            self.heap.pop();
        }
        self.capacity = capacity;
    }

    fn drain(&mut self) -> Vec<Retained<T>> {
        self.heap
            .drain()
            .into_iter()
            .map(|entry| Retained {
                event: entry.event,
                priority: Some(entry.priority),
            })
            .collect()
    }

    fn events(&self) -> impl Iterator<Item = &T> {
        self.heap.iter().map(|entry| &entry.event)
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }
}
