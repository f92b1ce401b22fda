//! Aggregators for the event types of the agent.
//!
//! Each aggregator is a thin wrapper around an [`EventAggregator`](crate::EventAggregator) that
//! knows how to prioritize, validate and count its own event type. Create one of each per process
//! and hand them to the code that records events and to the [`Harvester`](crate::Harvester).

use std::collections::BTreeMap;

use serde_json::Value;

mod custom;
mod error;
mod log;
mod synthetics;
mod transaction;

pub use self::custom::*;
pub use self::error::*;
pub use self::log::*;
pub use self::synthetics::*;
pub use self::transaction::*;

/// Arbitrary attributes attached to an event.
pub type Attributes = BTreeMap<String, Value>;

/// Truncates `s` to at most `max_bytes` without splitting a character.
pub(crate) fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }

    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
