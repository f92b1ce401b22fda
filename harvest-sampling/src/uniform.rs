use crate::random::{PcgSource, RandomSource};
use crate::reservoir::{Counters, Reservoir, Retained, Sealed};
use crate::sample::Sample;

/// A fixed capacity buffer holding a uniform random sample of all offered events.
///
/// Admission follows Algorithm R: the first `capacity` arrivals are always kept. Arrival `i`
/// (counted from zero) after that draws `j` uniformly from `0..=i` and replaces slot `j` if
/// `j < capacity`, otherwise it is discarded. After `n` arrivals, every arrival is retained with
/// probability `capacity / n`.
///
/// Priorities passed to [`Reservoir::try_admit`] are ignored.
#[derive(Clone, Debug)]
pub struct UniformSampledBuffer<T, R = PcgSource> {
    items: Vec<T>,
    capacity: usize,
    counters: Counters,
    random: R,
}

impl<T, R: RandomSource + Default> UniformSampledBuffer<T, R> {
    /// Creates an empty buffer drawing from the given random source.
    pub fn with_random(capacity: usize, random: R) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            counters: Counters::default(),
            random,
        }
    }

    /// Offers an event and returns whether it was retained.
    pub fn append(&mut self, event: T) -> bool {
        self.admit(event, None)
    }

    /// Offers an event built by `producer`, which is only invoked if the event is retained.
    pub fn append_with(&mut self, producer: impl FnOnce() -> T) -> bool {
        self.admit_with(producer, None)
    }

    /// Offers an event built by a fallible `producer`.
    ///
    /// If the producer fails, the offer is counted but nothing is stored, and the error is
    /// returned.
    pub fn try_append<E>(&mut self, producer: impl FnOnce() -> Result<T, E>) -> Result<bool, E> {
        self.try_admit(Sample::Lazy(producer), None)
    }

    /// Returns the retained events in slot order.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T, R> Sealed for UniformSampledBuffer<T, R> {}

impl<T, R: RandomSource + Default> Reservoir for UniformSampledBuffer<T, R> {
    type Item = T;

    fn with_capacity(capacity: usize) -> Self {
        Self::with_random(capacity, R::default())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn try_admit<F, E>(&mut self, sample: Sample<T, F>, _priority: Option<f64>) -> Result<bool, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        // Every offer is an arrival, even if its producer fails below.
        let arrival = self.counters.num_seen;
        self.counters.incr_seen();

        if self.items.len() < self.capacity {
            let event = sample.resolve()?;
            self.items.push(event);
            self.counters.incr_captured();
            return Ok(true);
        }

        if self.capacity == 0 {
            return Ok(false);
        }

        let slot = self.random.index_inclusive(arrival);
        if slot >= self.capacity as u64 {
            return Ok(false);
        }

        let event = sample.resolve()?;
        self.items[slot as usize] = event;
        Ok(true)
    }

    fn resize(&mut self, capacity: usize) {
        if capacity < self.items.len() {
            harvest_log::trace!(
                "shrinking uniform buffer from {} to {capacity} events",
                self.items.len()
            );

            // Partial Fisher-Yates: the first `capacity` slots become a uniform random subset.
            let last = self.items.len() - 1;
            for index in 0..capacity {
                let pick = index + self.random.index_inclusive((last - index) as u64) as usize;
                self.items.swap(index, pick);
            }
            self.items.truncate(capacity);
        }

        self.capacity = capacity;
    }

    fn drain(&mut self) -> Vec<Retained<T>> {
        self.items.drain(..).map(Retained::new).collect()
    }

    fn events(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeSet;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::random::ScriptedSource;

    fn filled(capacity: usize, count: u32) -> UniformSampledBuffer<u32> {
        let mut buffer = UniformSampledBuffer::with_random(capacity, PcgSource::seeded(7));
        for i in 0..count {
            buffer.append(i);
        }
        buffer
    }

    #[test]
    fn test_counts_after_overflow() {
        for (capacity, count) in [(1, 1), (5, 5), (5, 100), (100, 1000)] {
            let buffer = filled(capacity, count);
            assert_eq!(buffer.len(), capacity);
            assert_eq!(buffer.num_seen(), count as u64);
            assert_eq!(buffer.num_dropped(), count as u64 - capacity as u64);
        }
    }

    #[test]
    fn test_size_tracks_arrivals_below_capacity() {
        let buffer = filled(10, 3);
        assert_eq!(buffer.as_slice(), &[0, 1, 2]);
        assert_eq!(buffer.num_dropped(), 0);
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_forced_draws_replace_slots() {
        let mut buffer = UniformSampledBuffer::with_random(5, ScriptedSource::with_indexes(0..5));
        let kept: Vec<_> = (0..10).map(|i| buffer.append(i)).collect();

        assert!(kept.iter().all(|&k| k));
        assert_eq!(buffer.as_slice(), &[5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_forced_draws_discard() {
        let mut buffer = UniformSampledBuffer::with_random(5, ScriptedSource::with_indexes(5..10));
        for i in 0..10 {
            buffer.append(i);
        }

        assert_eq!(buffer.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(buffer.num_seen(), 10);
        assert_eq!(buffer.num_dropped(), 5);
    }

    #[test]
    fn test_metadata() {
        let buffer = filled(5, 7);
        insta::assert_debug_snapshot!(buffer.metadata(), @r"
        ReservoirMetadata {
            capacity: 5,
            captured: 5,
            seen: 7,
        }
        ");
    }

    #[test]
    fn test_producer_not_invoked_on_discard() {
        let calls = Cell::new(0);
        let mut buffer = UniformSampledBuffer::with_random(2, ScriptedSource::with_indexes([9]));
        buffer.append(0);
        buffer.append(1);

        let kept = buffer.append_with(|| {
            calls.set(calls.get() + 1);
            2
        });

        assert!(!kept);
        assert_eq!(calls.get(), 0);
        assert_eq!(buffer.num_seen(), 3);
    }

    #[test]
    fn test_producer_invoked_on_keep() {
        let calls = Cell::new(0);
        let mut buffer = UniformSampledBuffer::<u32>::with_random(2, PcgSource::seeded(1));

        assert!(buffer.append_with(|| {
            calls.set(calls.get() + 1);
            42
        }));
        assert_eq!(calls.get(), 1);
        assert_eq!(buffer.as_slice(), &[42]);
    }

    #[test]
    fn test_failed_producer_counts_arrival() {
        let mut buffer = UniformSampledBuffer::with_random(2, ScriptedSource::with_indexes([0, 1]));
        buffer.append(1);
        buffer.append(2);

        let result = buffer.try_append(|| Err::<u32, _>("payload unavailable"));
        assert_eq!(result, Err("payload unavailable"));
        assert_eq!(buffer.as_slice(), &[1, 2]);
        assert_eq!(buffer.captured_lifetime(), 2);

        let result = buffer.try_append(|| Err::<u32, _>("payload unavailable"));
        assert!(result.is_err());
        assert_eq!(buffer.as_slice(), &[1, 2]);

        // Failed offers still count as arrivals.
        assert_eq!(buffer.num_seen(), 4);
        assert_eq!(buffer.seen_lifetime(), 4);
        assert_eq!(buffer.num_dropped(), 2);
    }

    #[test]
    fn test_shrink_keeps_subset() {
        harvest_test::setup();

        let mut buffer = filled(10, 10);
        buffer.resize(5);

        let retained: BTreeSet<_> = buffer.events().copied().collect();
        assert_eq!(retained.len(), 5);
        assert!(retained.iter().all(|&i| i < 10));
        assert_eq!(buffer.num_seen(), 10);
        assert_eq!(buffer.num_dropped(), 5);
    }

    #[test]
    fn test_shrink_is_uniform() {
        let mut hits = [0u32; 10];

        for seed in 0..2000 {
            let mut buffer = UniformSampledBuffer::with_random(10, PcgSource::seeded(seed));
            for i in 0..10usize {
                buffer.append(i);
            }
            buffer.resize(5);
            for &i in buffer.as_slice() {
                hits[i] += 1;
            }
        }

        // Each element is kept with probability 1/2, so about 1000 times.
        for count in hits {
            assert!((800..1200).contains(&count), "{hits:?}");
        }
    }

    #[test]
    fn test_grow_keeps_all() {
        let mut buffer = filled(10, 10);
        buffer.resize(20);

        let retained: Vec<_> = buffer.events().copied().collect();
        assert_eq!(retained, (0..10).collect::<Vec<_>>());
        assert_eq!(buffer.num_dropped(), 0);

        buffer.append(10);
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn test_zero_capacity_discards() {
        let calls = Cell::new(0);
        let mut buffer = UniformSampledBuffer::<u32>::with_random(0, PcgSource::seeded(0));

        assert!(!buffer.append_with(|| {
            calls.set(calls.get() + 1);
            1
        }));
        assert_eq!(calls.get(), 0);
        assert_eq!(buffer.num_dropped(), 1);
    }

    #[test]
    fn test_reset_keeps_lifetime_counts() {
        let mut buffer = filled(5, 8);
        assert_eq!(buffer.captured_lifetime(), 5);

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.num_seen(), 0);
        assert_eq!(buffer.seen_lifetime(), 8);

        buffer.append(1);
        assert_eq!(buffer.seen_lifetime(), 9);
        assert_eq!(buffer.captured_lifetime(), 6);
        assert_eq!(buffer.sample_rate(), 1.0);
        assert_eq!(buffer.sample_rate_lifetime(), 6.0 / 9.0);
    }

    #[test]
    fn test_reset_lifetime() {
        let mut buffer = filled(5, 8);
        buffer.reset_lifetime();

        assert_eq!(buffer.seen_lifetime(), 0);
        assert_eq!(buffer.captured_lifetime(), 0);
        assert_eq!(buffer.sample_rate_lifetime(), 0.0);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.num_seen(), 8);
    }
}
