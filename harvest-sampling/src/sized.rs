use crate::reservoir::{Counters, Reservoir, Retained, Sealed};
use crate::sample::Sample;

/// A fixed capacity buffer retaining the first events of a window.
///
/// Arrivals are kept until the buffer is full and discarded afterwards, without sampling.
/// Priorities are stored with each event but do not influence retention.
#[derive(Clone, Debug)]
pub struct SizedBuffer<T> {
    items: Vec<Retained<T>>,
    capacity: usize,
    counters: Counters,
}

impl<T> Sealed for SizedBuffer<T> {}

impl<T> Reservoir for SizedBuffer<T> {
    type Item = T;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            counters: Counters::default(),
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn try_admit<F, E>(&mut self, sample: Sample<T, F>, priority: Option<f64>) -> Result<bool, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.counters.incr_seen();
        if self.items.len() >= self.capacity {
            return Ok(false);
        }

        let event = sample.resolve()?;
        self.items.push(Retained { event, priority });
        self.counters.incr_captured();
        Ok(true)
    }

    /// Shrinking drops the newest events.
    fn resize(&mut self, capacity: usize) {
        self.items.truncate(capacity);
        self.capacity = capacity;
    }

    fn drain(&mut self) -> Vec<Retained<T>> {
        std::mem::take(&mut self.items)
    }

    fn events(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|retained| &retained.event)
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }
}
