//! The common interface of all event stream parsers.

use crate::error::Result;
use crate::event::Event;

/// A parsed source of chip register events.
///
/// The time base and, where the format declares it, the duration
/// are available before iteration begins.
/// The events are produced lazily by consuming the source:
/// a stream can be traversed only once.
/// To read the same data again, open the source again.
pub trait EventSource {
    /// The lazy sequence of events,
    /// terminated by exactly one [`Event::End`].
    ///
    /// A format error is yielded as the last item of the sequence.
    type Events: Iterator<Item = Result<Event>>;

    /// Ticks per second of all timestamps produced by this source
    fn time_base(&self) -> u32;

    /// The duration of the stream in ticks,
    /// if known before iteration
    fn duration(&self) -> Option<u64>;

    /// Start producing events
    fn into_events(self) -> Self::Events;
}
