//! Sources of randomness for the sampling containers.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Supplies the random draws a reservoir needs for its admission decisions.
pub trait RandomSource {
    /// Returns a uniformly distributed index in `0..=upper`.
    fn index_inclusive(&mut self, upper: u64) -> u64;

    /// Returns a uniformly distributed priority in `[0, 1)`.
    fn priority(&mut self) -> f64;
}

/// A fast, non-cryptographic random source.
///
/// Each reservoir owns its own generator, so draws never contend across aggregators.
#[derive(Clone, Debug)]
pub struct PcgSource(Pcg32);

impl PcgSource {
    /// Creates a source seeded from the thread-local generator.
    pub fn from_entropy() -> Self {
        Self(Pcg32::from_rng(&mut rand::rng()))
    }

    /// Creates a source that repeats the same sequence for the same seed.
    pub fn seeded(seed: u64) -> Self {
        Self(Pcg32::seed_from_u64(seed))
    }
}

impl Default for PcgSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for PcgSource {
    fn index_inclusive(&mut self, upper: u64) -> u64 {
        self.0.random_range(0..=upper)
    }

    fn priority(&mut self) -> f64 {
        self.0.random()
    }
}

/// A source that replays scripted draws, for deterministic tests.
///
/// Scripted indexes are clamped to the requested upper bound. Once a script runs out, draws fall
/// back to a seeded [`PcgSource`].
#[derive(Clone, Debug)]
pub struct ScriptedSource {
    indexes: VecDeque<u64>,
    priorities: VecDeque<f64>,
    fallback: PcgSource,
}

impl ScriptedSource {
    /// Creates a source that returns `indexes` for the next index draws.
    pub fn with_indexes(indexes: impl IntoIterator<Item = u64>) -> Self {
        Self {
            indexes: indexes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Creates a source that returns `priorities` for the next priority draws.
    pub fn with_priorities(priorities: impl IntoIterator<Item = f64>) -> Self {
        Self {
            priorities: priorities.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            indexes: VecDeque::new(),
            priorities: VecDeque::new(),
            fallback: PcgSource::seeded(0),
        }
    }
}

impl RandomSource for ScriptedSource {
    fn index_inclusive(&mut self, upper: u64) -> u64 {
        match self.indexes.pop_front() {
            Some(index) => index.min(upper),
            None => self.fallback.index_inclusive(upper),
        }
    }

    fn priority(&mut self) -> f64 {
        match self.priorities.pop_front() {
            Some(priority) => priority,
            None => self.fallback.priority(),
        }
    }
}

/// Returns a random priority in `[0, 1)` from the thread-local generator.
pub fn random_priority() -> f64 {
    rand::rng().random()
}

/// Returns the priority for an event of a unit of work with a sampling decision.
///
/// Sampled work is boosted by `1.0`, so it always outranks events of unsampled work while events
/// within each group are still ordered randomly.
pub fn priority_for(sampled: bool) -> f64 {
    let priority = random_priority();
    if sampled { priority + 1.0 } else { priority }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_repeatable() {
        let mut a = PcgSource::seeded(42);
        let mut b = PcgSource::seeded(42);

        for upper in 0..100 {
            let draw = a.index_inclusive(upper);
            assert_eq!(draw, b.index_inclusive(upper));
            assert!(draw <= upper);
        }
    }

    #[test]
    fn test_scripted_clamps_and_falls_back() {
        let mut source = ScriptedSource::with_indexes([3, 9]);
        assert_eq!(source.index_inclusive(10), 3);
        assert_eq!(source.index_inclusive(4), 4);
        assert!(source.index_inclusive(2) <= 2);
    }

    #[test]
    fn test_priority_range() {
        for _ in 0..1000 {
            let p = priority_for(false);
            assert!((0.0..1.0).contains(&p));
            let p = priority_for(true);
            assert!((1.0..2.0).contains(&p));
        }
    }
}
