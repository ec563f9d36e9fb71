//! Event sources driven by external synthesis engines.
//!
//! Tracker module players and MIDI-to-OPL synthesizers are not implemented here.
//! They are plugged in through two narrow traits:
//! [`RegisterEngine`] for engines which advance one tick per update
//! and report their chip register writes through a callback,
//! and [`MidiSynth`] for engines which turn MIDI messages into register writes.
//! The parsers in this module turn their output into canonical events,
//! dropping writes which do not change the register contents.

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;

use snafu::ensure;

use crate::error::{Result, UnsupportedTimeBaseSnafu};
use crate::event::Event;
use crate::registers::OPL3_MODE;
use crate::source::EventSource;
use crate::state::RegisterSnapshot;

/// A frame-stepped player which produces OPL register writes,
/// such as a tracker module replayer.
pub trait RegisterEngine {
    /// Number of updates per second,
    /// or `None` if the loaded song uses an unsupported timing mode
    fn time_base(&self) -> Option<u32>;

    /// Advance the engine by one tick,
    /// calling `write` with each register (9-bit OPL address) and value written.
    ///
    /// Returns `true` once the song has ended.
    fn update(&mut self, write: &mut dyn FnMut(u16, u8)) -> bool;
}

/// A MIDI-to-OPL synthesis engine
pub trait MidiSynth {
    /// Set the engine clock, in milliseconds
    fn set_time(&mut self, milliseconds: u64);

    /// Run the engine's periodic processing (envelopes, vibrato, ...)
    fn update(&mut self, write: &mut dyn FnMut(u16, u8));

    /// Deliver a raw MIDI channel or system message
    fn send(&mut self, message: &[u8], write: &mut dyn FnMut(u16, u8));
}

/// A message of a MIDI file, in playback order
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMessage {
    /// Time since the previous message, in seconds
    pub delta: f64,
    /// Raw message bytes, status byte first
    pub data: Vec<u8>,
    /// Whether this is a meta message,
    /// which only advances time
    pub is_meta: bool,
}

/// Register writes waiting to be yielded,
/// without those which would not change the chip state
#[derive(Debug, Default)]
struct WriteQueue {
    registers: RegisterSnapshot,
    pending: VecDeque<Event>,
}

impl WriteQueue {
    fn push(&mut self, event: Event) {
        if self.registers.is_redundant(&event) {
            log::trace!("Dropping redundant engine write {:?}", event);
            return;
        }
        self.registers.update(&event);
        self.pending.push_back(event);
    }
}

/// An event source over a [`RegisterEngine`]
#[derive(Debug)]
pub struct EngineParser<E> {
    engine: E,
    time_base: u32,
}

impl<E> EngineParser<E>
where
    E: RegisterEngine,
{
    /// Wrap an engine with a loaded song.
    ///
    /// Fails if the engine does not report a usable time base.
    pub fn new(engine: E) -> Result<Self> {
        let time_base = engine.time_base().unwrap_or(0);
        ensure!(time_base > 0, UnsupportedTimeBaseSnafu);
        log::debug!("Register engine running at {} Hz", time_base);
        Ok(EngineParser { engine, time_base })
    }
}

impl<E> EventSource for EngineParser<E>
where
    E: RegisterEngine,
{
    type Events = EngineEvents<E>;

    fn time_base(&self) -> u32 {
        self.time_base
    }

    fn duration(&self) -> Option<u64> {
        None
    }

    fn into_events(self) -> EngineEvents<E> {
        EngineEvents {
            engine: self.engine,
            queue: WriteQueue::default(),
            time: 0,
            finished: false,
            done: false,
        }
    }
}

/// Events of a [`RegisterEngine`], one engine update per tick
#[derive(Debug)]
pub struct EngineEvents<E> {
    engine: E,
    queue: WriteQueue,
    time: u64,
    finished: bool,
    done: bool,
}

impl<E> Iterator for EngineEvents<E>
where
    E: RegisterEngine,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            if self.finished {
                self.done = true;
                return Some(Ok(Event::End { time: self.time }));
            }

            let time = self.time;
            let queue = &mut self.queue;
            self.finished = self
                .engine
                .update(&mut |register, value| queue.push(Event::opl_write(time, register, value)));
            if !self.finished {
                self.time += 1;
            }
        }
    }
}

/// Ticks per second of MIDI-driven streams (milliseconds)
pub const MIDI_TIME_BASE: u32 = 1000;

/// An event source which plays MIDI messages through a [`MidiSynth`]
#[derive(Debug)]
pub struct MidiParser<S, M> {
    synth: S,
    messages: M,
}

impl<S, M> MidiParser<S, M>
where
    S: MidiSynth,
    M: IntoIterator<Item = MidiMessage>,
{
    /// Play the given messages through a synthesizer
    pub fn new(synth: S, messages: M) -> Self {
        MidiParser { synth, messages }
    }
}

impl<S, M> EventSource for MidiParser<S, M>
where
    S: MidiSynth,
    M: IntoIterator<Item = MidiMessage>,
{
    type Events = MidiEvents<S, M::IntoIter>;

    fn time_base(&self) -> u32 {
        MIDI_TIME_BASE
    }

    fn duration(&self) -> Option<u64> {
        None
    }

    fn into_events(self) -> Self::Events {
        let mut queue = WriteQueue::default();
        // the synthesizer drives an OPL3 in OPL3 mode
        queue.push(Event::opl_write(0, OPL3_MODE, 0x01));
        MidiEvents {
            synth: self.synth,
            messages: self.messages.into_iter(),
            queue,
            message_time: 0.,
            time: 0,
            done: false,
        }
    }
}

/// Events of a [`MidiSynth`] playing a MIDI message sequence.
///
/// The synthesizer is updated once per millisecond
/// until each message is due.
#[derive(Debug)]
pub struct MidiEvents<S, M> {
    synth: S,
    messages: M,
    queue: WriteQueue,
    /// Due time of the last message, in milliseconds
    message_time: f64,
    time: u64,
    done: bool,
}

impl<S, M> Iterator for MidiEvents<S, M>
where
    S: MidiSynth,
    M: Iterator<Item = MidiMessage>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }

            let Some(message) = self.messages.next() else {
                self.done = true;
                return Some(Ok(Event::End { time: self.time }));
            };

            self.message_time += message.delta * f64::from(MIDI_TIME_BASE);
            while (self.time as f64) < self.message_time {
                let time = self.time;
                let queue = &mut self.queue;
                self.synth.set_time(time);
                self.synth
                    .update(&mut |register, value| queue.push(Event::opl_write(time, register, value)));
                self.time += 1;
            }
            if !message.is_meta {
                let time = self.time;
                let queue = &mut self.queue;
                self.synth.send(&message.data, &mut |register, value| {
                    queue.push(Event::opl_write(time, register, value))
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineParser, MidiMessage, MidiParser, MidiSynth, RegisterEngine};
    use crate::error::{Error, FormatError};
    use crate::event::Event;
    use crate::source::EventSource;

    /// Plays back a fixed list of writes per tick
    struct ScriptedEngine {
        time_base: Option<u32>,
        ticks: Vec<Vec<(u16, u8)>>,
        tick: usize,
    }

    impl RegisterEngine for ScriptedEngine {
        fn time_base(&self) -> Option<u32> {
            self.time_base
        }

        fn update(&mut self, write: &mut dyn FnMut(u16, u8)) -> bool {
            for &(register, value) in &self.ticks[self.tick] {
                write(register, value);
            }
            self.tick += 1;
            self.tick == self.ticks.len()
        }
    }

    #[test]
    fn engine_writes_are_stamped_and_deduplicated() {
        let engine = ScriptedEngine {
            time_base: Some(50),
            ticks: vec![
                vec![(0x20, 0x01), (0xB0, 0x31)],
                vec![(0x20, 0x01)],
                vec![],
                vec![(0xB0, 0x11)],
            ],
            tick: 0,
        };
        let parser = EngineParser::new(engine).unwrap();
        assert_eq!(parser.time_base(), 50);
        assert_eq!(
            parser.into_events().collect::<Result<Vec<_>, _>>().unwrap(),
            vec![
                Event::opl_write(0, 0x20, 0x01),
                Event::opl_write(0, 0xB0, 0x31),
                // the final tick's writes are kept
                Event::opl_write(3, 0xB0, 0x11),
                Event::End { time: 3 },
            ]
        );
    }

    #[test]
    fn unsupported_time_base_is_rejected() {
        let engine = ScriptedEngine {
            time_base: None,
            ticks: vec![vec![]],
            tick: 0,
        };
        assert!(matches!(
            EngineParser::new(engine),
            Err(Error::Format {
                source: FormatError::UnsupportedTimeBase
            })
        ));
    }

    /// Writes the note number to 0xA0 on note on,
    /// and the clock in tenths of a second to 0x40 on update
    #[derive(Default)]
    struct RecordingSynth {
        clock: u64,
        updates: usize,
    }

    impl MidiSynth for RecordingSynth {
        fn set_time(&mut self, milliseconds: u64) {
            self.clock = milliseconds;
        }

        fn update(&mut self, write: &mut dyn FnMut(u16, u8)) {
            self.updates += 1;
            write(0x40, (self.clock / 100) as u8);
        }

        fn send(&mut self, message: &[u8], write: &mut dyn FnMut(u16, u8)) {
            if message[0] & 0xF0 == 0x90 {
                write(0xA0, message[1]);
            }
        }
    }

    fn message(delta: f64, data: &[u8], is_meta: bool) -> MidiMessage {
        MidiMessage {
            delta,
            data: data.to_vec(),
            is_meta,
        }
    }

    #[test]
    fn midi_messages_are_delivered_when_due() {
        let messages = vec![
            message(0., &[0x90, 60, 100], false),
            message(0.5, &[0xFF, 0x51, 0x03], true),
            message(0.25, &[0x90, 62, 100], false),
        ];
        let parser = MidiParser::new(RecordingSynth::default(), messages);
        assert_eq!(parser.time_base(), 1000);
        assert_eq!(parser.duration(), None);

        let mut events = parser.into_events();
        let collected = events.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        let mut expected = vec![
            Event::opl_write(0, 0x105, 0x01),
            Event::opl_write(0, 0xA0, 60),
        ];
        // one update per millisecond, unchanged values dropped
        expected.extend((0..8).map(|tenth| Event::opl_write(tenth * 100, 0x40, tenth as u8)));
        expected.push(Event::opl_write(750, 0xA0, 62));
        expected.push(Event::End { time: 750 });
        assert_eq!(collected, expected);

        assert_eq!(events.synth.updates, 750);
        assert_eq!(events.synth.clock, 749);
        assert!(events.next().is_none());
    }
}
