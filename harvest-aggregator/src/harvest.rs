use harvest_sampling::Retained;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

/// Describes the window a [`Harvest`] was taken from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct HarvestMetadata {
    /// The capacity of the reservoir while the events were collected.
    pub reservoir_size: usize,
    /// The number of events offered during the window.
    pub events_seen: u64,
}

/// The events drained from an aggregator, detached from it.
///
/// A harvest serializes as a two element tuple of its metadata and the list of events, which is
/// the payload a transport sends. If sending fails, the harvest can be handed back to the
/// aggregator with [`EventAggregator::merge`](crate::EventAggregator::merge).
#[derive(Clone, Debug, PartialEq)]
pub struct Harvest<E> {
    metadata: HarvestMetadata,
    entries: Vec<Retained<E>>,
}

impl<E> Harvest<E> {
    /// Creates a harvest from its parts.
    pub fn new(metadata: HarvestMetadata, entries: Vec<Retained<E>>) -> Self {
        Self { metadata, entries }
    }

    /// Returns the metadata of the harvested window.
    pub fn metadata(&self) -> HarvestMetadata {
        self.metadata
    }

    /// Returns the number of harvested events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no events were harvested.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the harvested events.
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|retained| &retained.event)
    }

    /// Returns the harvested events along with their admission priorities.
    pub fn entries(&self) -> &[Retained<E>] {
        &self.entries
    }

    /// Consumes the harvest and returns the events.
    pub fn into_events(self) -> Vec<E> {
        self.entries.into_iter().map(|retained| retained.event).collect()
    }

    /// Consumes the harvest and returns its parts.
    pub fn into_parts(self) -> (HarvestMetadata, Vec<Retained<E>>) {
        (self.metadata, self.entries)
    }
}

impl<E: Serialize> Serialize for Harvest<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.metadata)?;
        tuple.serialize_element(&EventList(&self.entries))?;
        tuple.end()
    }
}

struct EventList<'a, E>(&'a [Retained<E>]);

impl<E: Serialize> Serialize for EventList<'_, E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|retained| &retained.event))
    }
}
