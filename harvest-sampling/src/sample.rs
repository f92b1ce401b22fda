/// An event offered to a reservoir, either precomputed or produced on demand.
///
/// A [`Sample::Lazy`] producer is only invoked when the reservoir decides to keep the event, so
/// callers can skip building expensive payloads that would be discarded anyway. The producer runs
/// while the owning aggregator holds its lock and must not block.
///
/// Producers are fallible. If a producer fails, the reservoir is left exactly as it was before the
/// event was offered and the error is returned to the caller.
#[derive(Debug)]
pub enum Sample<T, F> {
    /// A precomputed event.
    Value(T),
    /// A producer for the event.
    Lazy(F),
}

impl<T, F, E> Sample<T, F>
where
    F: FnOnce() -> Result<T, E>,
{
    /// Returns the event, invoking the producer if necessary.
    pub fn resolve(self) -> Result<T, E> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Lazy(producer) => producer(),
        }
    }
}
