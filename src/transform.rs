//! Lazy transformations of event streams.
//!
//! Every transform is an iterator adapter over `Result<Event, E>` items.
//! Errors are forwarded untouched and do not end the stream by themselves.
//! The adapters assume that their input is well formed:
//! non-decreasing times and a single final [`Event::End`].
//!
//! Adapters are usually chained through [`EventStreamExt`]:
//!
//! ```
//! use fmstream::event::Event;
//! use fmstream::transform::EventStreamExt;
//!
//! let events = vec![
//!     Ok::<_, ()>(Event::opl_write(0, 0x20, 0x01)),
//!     Ok(Event::opl_write(10, 0x20, 0x01)),
//!     Ok(Event::End { time: 20 }),
//! ];
//! let out: Result<Vec<_>, _> = events.into_iter().optimise().add_end_pause(5).collect();
//! assert_eq!(
//!     out.unwrap(),
//!     vec![Event::opl_write(0, 0x20, 0x01), Event::End { time: 25 }],
//! );
//! ```

#[cfg(not(feature = "std"))]
use alloc::collections::{BTreeSet, VecDeque};
#[cfg(feature = "std")]
use std::collections::{BTreeSet, VecDeque};

use crate::event::Event;
use crate::registers::{
    is_key_on, key_off, OPL_KEY_ON_BIT, OPL_KEY_ON_BLOCK_FNUM_RANGE, OPL_SECONDARY_BANK,
    OPM_CHANNELS, OPM_KEY_ON,
};
use crate::state::RegisterSnapshot;
use crate::time::convert_time_base;

/// Drops writes of the value a register already holds.
///
/// The known register state is forgotten at every [`Event::Marker`],
/// so writes right after a marker are always kept.
#[derive(Debug, Clone)]
pub struct Optimise<I> {
    inner: I,
    registers: RegisterSnapshot,
}

impl<I> Optimise<I> {
    /// Drop redundant writes from a stream
    pub fn new(inner: I) -> Self {
        Optimise {
            inner,
            registers: RegisterSnapshot::new(),
        }
    }
}

impl<I, E> Iterator for Optimise<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.inner.next()? {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            let redundant = self.registers.is_redundant(&event);
            self.registers.update(&event);
            if let Event::Marker { .. } = event {
                self.registers.clear();
            }
            if redundant {
                log::trace!("Dropping redundant write {:?}", event);
                continue;
            }
            return Some(Ok(event));
        }
    }
}

/// Decides where a stream should start
pub trait TrimCondition {
    /// Inspect the next event before the start point.
    ///
    /// Returns the time to cut at once the start point is found,
    /// `None` to keep looking.
    fn cut_time(&mut self, event: &Event) -> Option<u64>;
}

impl<F> TrimCondition for F
where
    F: FnMut(&Event) -> Option<u64>,
{
    fn cut_time(&mut self, event: &Event) -> Option<u64> {
        self(event)
    }
}

/// The common start points of a trimmed stream
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrimPoint {
    /// The first key on write
    Silence,
    /// The first marker with this index
    Marker(u32),
    /// The given time, in ticks of the stream
    Time(u64),
}

impl TrimCondition for TrimPoint {
    fn cut_time(&mut self, event: &Event) -> Option<u64> {
        match *self {
            TrimPoint::Silence if is_key_on(event) => Some(event.time()),
            TrimPoint::Marker(index) => match *event {
                Event::Marker { time, index: i } if i == index => Some(time),
                _ => None,
            },
            TrimPoint::Time(time) if event.time() >= time => Some(time),
            _ => None,
        }
    }
}

/// Removes the start of a stream, up to a cut point.
///
/// Events before the cut are only used to build up the chip register state,
/// with notes turned off.
/// At the cut, that register state is written out at time 0,
/// followed by the rest of the stream with the cut time subtracted.
/// A stream which never reaches the cut point becomes a single `End { time: 0 }`.
#[derive(Debug, Clone)]
pub struct TrimStart<I, C> {
    inner: I,
    condition: C,
    registers: RegisterSnapshot,
    replay: VecDeque<Event>,
    cut: Option<u64>,
    done: bool,
}

impl<I, C> TrimStart<I, C> {
    /// Cut a stream at the first event matching `condition`
    pub fn new(inner: I, condition: C) -> Self {
        TrimStart {
            inner,
            condition,
            registers: RegisterSnapshot::new(),
            replay: VecDeque::new(),
            cut: None,
            done: false,
        }
    }
}

impl<I, C, E> Iterator for TrimStart<I, C>
where
    I: Iterator<Item = Result<Event, E>>,
    C: TrimCondition,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.replay.pop_front() {
            return Some(Ok(event));
        }
        if self.done {
            return None;
        }

        if let Some(cut) = self.cut {
            return match self.inner.next() {
                Some(Ok(event)) => Some(Ok(event.with_time(event.time().saturating_sub(cut)))),
                Some(Err(e)) => Some(Err(e)),
                None => {
                    self.done = true;
                    None
                }
            };
        }

        loop {
            let event = match self.inner.next() {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    log::warn!("Start point not found, the stream is empty");
                    self.done = true;
                    return Some(Ok(Event::End { time: 0 }));
                }
            };

            let Some(cut) = self.condition.cut_time(&event) else {
                self.registers.update(&key_off(event));
                continue;
            };
            log::debug!("Cutting stream start at {}", cut);
            self.cut = Some(cut);
            self.replay = self.registers.replay(0).into();
            self.registers.clear();
            self.replay
                .push_back(event.with_time(event.time().saturating_sub(cut)));
            return self.replay.pop_front().map(Ok);
        }
    }
}

/// Ends a stream at a fixed time.
///
/// Events at or after the end time are dropped
/// and the stream ends with `End { time }`,
/// even if the input ended earlier.
#[derive(Debug, Clone)]
pub struct SetEndpoint<I> {
    inner: I,
    time: u64,
    done: bool,
}

impl<I> SetEndpoint<I> {
    /// End a stream at `time`
    pub fn new(inner: I, time: u64) -> Self {
        SetEndpoint {
            inner,
            time,
            done: false,
        }
    }
}

impl<I, E> Iterator for SetEndpoint<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Ok(Event::End { .. })) => continue,
                Some(Ok(event)) if event.time() < self.time => return Some(Ok(event)),
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(_)) | None => {
                    self.done = true;
                    return Some(Ok(Event::End { time: self.time }));
                }
            }
        }
    }
}

/// Turns all notes off at the end of a stream.
///
/// For OPL, every key on/block/F-number register which was written
/// is written again with the key on bit cleared.
/// For OPM, a key off is written for all 8 channels.
/// Only chip families which appear in the stream are affected.
#[derive(Debug, Clone)]
pub struct AddKeyOff<I> {
    inner: I,
    registers: RegisterSnapshot,
    end_time: u64,
    uses_opl: bool,
    uses_opm: bool,
    tail: VecDeque<Event>,
    finished: bool,
}

impl<I> AddKeyOff<I> {
    /// Release the notes still playing at the end of a stream
    pub fn new(inner: I) -> Self {
        AddKeyOff {
            inner,
            registers: RegisterSnapshot::new(),
            end_time: 0,
            uses_opl: false,
            uses_opm: false,
            tail: VecDeque::new(),
            finished: false,
        }
    }

    fn build_tail(&mut self) {
        let time = self.end_time;
        if self.uses_opl {
            for channel in OPL_KEY_ON_BLOCK_FNUM_RANGE {
                let primary = u16::from(channel);
                for register in [primary, primary | OPL_SECONDARY_BANK] {
                    if let Some(value) = self.registers.opl(register) {
                        self.tail
                            .push_back(Event::opl_write(time, register, value & !OPL_KEY_ON_BIT));
                    }
                }
            }
        }
        if self.uses_opm {
            for channel in 0..OPM_CHANNELS {
                self.tail
                    .push_back(Event::opm_write(time, OPM_KEY_ON, channel));
            }
        }
        self.tail.push_back(Event::End { time });
    }
}

impl<I, E> Iterator for AddKeyOff<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.tail.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            match self.inner.next() {
                Some(Ok(event)) => {
                    self.registers.update(&event);
                    self.end_time = event.time();
                    match event {
                        Event::OplWrite { .. } => self.uses_opl = true,
                        Event::OpmWrite { .. } => self.uses_opm = true,
                        Event::End { .. } => continue,
                        _ => {}
                    }
                    return Some(Ok(event));
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.finished = true;
                    self.build_tail();
                }
            }
        }
    }
}

/// Extends the end of a stream by a fixed amount of ticks
#[derive(Debug, Clone)]
pub struct AddEndPause<I> {
    inner: I,
    pause: u64,
    end_time: u64,
    done: bool,
}

impl<I> AddEndPause<I> {
    /// Delay the end of a stream by `pause` ticks
    pub fn new(inner: I, pause: u64) -> Self {
        AddEndPause {
            inner,
            pause,
            end_time: 0,
            done: false,
        }
    }
}

impl<I, E> Iterator for AddEndPause<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Ok(event)) => {
                    self.end_time = event.time();
                    if !event.is_end() {
                        return Some(Ok(event));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    return Some(Ok(Event::End {
                        time: self.end_time + self.pause,
                    }));
                }
            }
        }
    }
}

/// Ends a stream when a marker index occurs for the second time.
///
/// The repeated marker is replaced by a jump back to the first one
/// (unless `end_on_loop` is set) and the end of the stream.
#[derive(Debug, Clone)]
pub struct DetectLoop<I> {
    inner: I,
    end_on_loop: bool,
    seen: BTreeSet<u32>,
    end: Option<Event>,
    done: bool,
}

impl<I> DetectLoop<I> {
    /// Detect repeated markers in a stream
    pub fn new(inner: I, end_on_loop: bool) -> Self {
        DetectLoop {
            inner,
            end_on_loop,
            seen: BTreeSet::new(),
            end: None,
            done: false,
        }
    }
}

impl<I, E> Iterator for DetectLoop<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(end) = self.end.take() {
            return Some(Ok(end));
        }
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Ok(Event::Marker { time, index }) if !self.seen.insert(index) => {
                log::debug!("Loop detected at marker {} (time {})", index, time);
                self.done = true;
                let end = Event::End { time };
                if self.end_on_loop {
                    Some(Ok(end))
                } else {
                    self.end = Some(end);
                    Some(Ok(Event::JumpToMarker { time, index }))
                }
            }
            item => Some(item),
        }
    }
}

/// Rebases every event time from one time base to another
#[derive(Debug, Clone)]
pub struct ConvertEventTimes<I> {
    inner: I,
    src_time_base: u32,
    dst_time_base: u32,
}

impl<I> ConvertEventTimes<I> {
    /// Rebase event times from one time base to another
    pub fn new(inner: I, src_time_base: u32, dst_time_base: u32) -> Self {
        ConvertEventTimes {
            inner,
            src_time_base,
            dst_time_base,
        }
    }
}

impl<I, E> Iterator for ConvertEventTimes<I>
where
    I: Iterator<Item = Result<Event, E>>,
{
    type Item = Result<Event, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let (src, dst) = (self.src_time_base, self.dst_time_base);
        self.inner.next().map(|item| {
            item.map(|event| event.with_time(convert_time_base(event.time(), src, dst)))
        })
    }
}

/// Chaining methods for event streams
pub trait EventStreamExt<E>: Iterator<Item = Result<Event, E>> + Sized {
    /// Drop writes which do not change the register state,
    /// see [`Optimise`]
    fn optimise(self) -> Optimise<Self> {
        Optimise::new(self)
    }

    /// Cut the start of the stream, see [`TrimStart`]
    fn trim_start<C: TrimCondition>(self, condition: C) -> TrimStart<Self, C> {
        TrimStart::new(self, condition)
    }

    /// Cut the stream up to the first key on
    fn trim_start_silence(self) -> TrimStart<Self, TrimPoint> {
        self.trim_start(TrimPoint::Silence)
    }

    /// Cut the stream up to the first marker with the given index
    fn trim_start_to_marker(self, index: u32) -> TrimStart<Self, TrimPoint> {
        self.trim_start(TrimPoint::Marker(index))
    }

    /// Cut the stream up to the given time
    fn trim_start_to_time(self, time: u64) -> TrimStart<Self, TrimPoint> {
        self.trim_start(TrimPoint::Time(time))
    }

    /// End the stream at the given time, see [`SetEndpoint`]
    fn set_endpoint(self, time: u64) -> SetEndpoint<Self> {
        SetEndpoint::new(self, time)
    }

    /// Release all notes at the end of the stream, see [`AddKeyOff`]
    fn add_key_off(self) -> AddKeyOff<Self> {
        AddKeyOff::new(self)
    }

    /// Extend the end of the stream by `pause` ticks
    fn add_end_pause(self, pause: u64) -> AddEndPause<Self> {
        AddEndPause::new(self, pause)
    }

    /// End the stream at the first repeated marker, see [`DetectLoop`]
    fn detect_loop(self, end_on_loop: bool) -> DetectLoop<Self> {
        DetectLoop::new(self, end_on_loop)
    }

    /// Rebase event times to another time base
    fn convert_event_times(self, src_time_base: u32, dst_time_base: u32) -> ConvertEventTimes<Self> {
        ConvertEventTimes::new(self, src_time_base, dst_time_base)
    }
}

impl<I, E> EventStreamExt<E> for I where I: Iterator<Item = Result<Event, E>> {}
