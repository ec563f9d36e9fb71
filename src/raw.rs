//! Raw OPL register dumps.
//!
//! A dump is a plain sequence of 12 byte records:
//! a little-endian `i64` timestamp in OPL3 sample ticks (49716 Hz),
//! a little-endian `u16` register and a little-endian `u16` value.
//! Registers below `0x200` are chip writes,
//! register `0x202` is a marker whose value is the marker index,
//! and any other register is ignored.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::path::Path;

#[cfg(feature = "std")]
use snafu::ResultExt;

#[cfg(feature = "std")]
use crate::error::ReadFileSnafu;
use crate::data_types::{i64_le_at, u16_le_at};
use crate::error::{NegativeTimestampSnafu, Result};
use crate::event::Event;
use crate::source::EventSource;

/// Ticks per second of raw dump timestamps (the OPL3 sample rate)
pub const TIME_BASE: u32 = 49_716;

/// Size of a single record in bytes
pub const RECORD_SIZE: usize = 12;

/// Pseudo-register of marker records
pub const MARKER_REGISTER: u16 = 0x202;

/// A raw OPL register dump
#[derive(Debug, Clone)]
pub struct RawOplParser<B> {
    data: B,
}

impl RawOplParser<Vec<u8>> {
    /// Read a raw register dump from a file in disk
    #[cfg(feature = "std")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path).context(ReadFileSnafu)?;
        Ok(Self::new(data))
    }
}

impl<B> RawOplParser<B>
where
    B: AsRef<[u8]>,
{
    /// Wrap the raw dump data.
    ///
    /// A trailing partial record is ignored.
    pub fn new(data: B) -> Self {
        let len = data.as_ref().len();
        if len % RECORD_SIZE != 0 {
            log::warn!(
                "Raw OPL dump has {} trailing bytes, ignoring them",
                len % RECORD_SIZE
            );
        }
        RawOplParser { data }
    }

    /// The number of complete records in the dump
    pub fn record_count(&self) -> usize {
        self.data.as_ref().len() / RECORD_SIZE
    }
}

impl<B> EventSource for RawOplParser<B>
where
    B: AsRef<[u8]>,
{
    type Events = RawOplEvents<B>;

    fn time_base(&self) -> u32 {
        TIME_BASE
    }

    fn duration(&self) -> Option<u64> {
        None
    }

    fn into_events(self) -> RawOplEvents<B> {
        RawOplEvents {
            data: self.data,
            index: 0,
            time: 0,
            done: false,
        }
    }
}

/// Lazy iterator over the records of a raw OPL dump
#[derive(Debug)]
pub struct RawOplEvents<B> {
    data: B,
    index: usize,
    time: u64,
    done: bool,
}

impl<B> RawOplEvents<B>
where
    B: AsRef<[u8]>,
{
    /// Decode one record,
    /// or `None` if the record is not an event
    fn record(&mut self, offset: usize) -> Result<Option<Event>> {
        let data = self.data.as_ref();
        let (Some(time), Some(register), Some(value)) = (
            i64_le_at(data, offset),
            u16_le_at(data, offset + 8),
            u16_le_at(data, offset + 10),
        ) else {
            return Ok(None);
        };
        let time = u64::try_from(time).map_err(|_| {
            NegativeTimestampSnafu {
                time,
                index: self.index,
            }
            .build()
        })?;
        self.time = time;

        Ok(match register {
            0..=0x1FF => Some(Event::opl_write(time, register, value as u8)),
            MARKER_REGISTER => Some(Event::Marker {
                time,
                index: u32::from(value),
            }),
            _ => {
                log::trace!("Skipping record #{} for register {:#x}", self.index, register);
                None
            }
        })
    }
}

impl<B> Iterator for RawOplEvents<B>
where
    B: AsRef<[u8]>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let records = self.data.as_ref().len() / RECORD_SIZE;
        while self.index < records {
            let offset = self.index * RECORD_SIZE;
            let record = self.record(offset);
            self.index += 1;
            match record {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        Some(Ok(Event::End { time: self.time }))
    }
}

#[cfg(test)]
mod tests {
    use super::{RawOplParser, TIME_BASE};
    use crate::error::{Error, FormatError};
    use crate::event::Event;
    use crate::source::EventSource;

    fn record(time: i64, register: u16, value: u16) -> Vec<u8> {
        let mut out = time.to_le_bytes().to_vec();
        out.extend_from_slice(&register.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
        out
    }

    #[test]
    fn decodes_writes_and_markers() {
        let data: Vec<u8> = [
            record(0, 0x105, 1),
            record(0, 0x105, 1),
            record(100, 0x202, 3),
            record(150, 0x201, 7),
            record(200, 0x1B0, 0x32),
        ]
        .concat();
        let parser = RawOplParser::new(data);
        assert_eq!(parser.time_base(), TIME_BASE);
        assert_eq!(parser.duration(), None);
        assert_eq!(parser.record_count(), 5);
        assert_eq!(
            parser.into_events().collect::<Result<Vec<_>, _>>().unwrap(),
            vec![
                // repeated writes are kept
                Event::opl_write(0, 0x105, 1),
                Event::opl_write(0, 0x105, 1),
                Event::Marker { time: 100, index: 3 },
                Event::opl_write(200, 0x1B0, 0x32),
                Event::End { time: 200 },
            ]
        );
    }

    #[test]
    fn end_time_includes_ignored_records() {
        let data = [record(10, 0x20, 1), record(90, 0x300, 0)].concat();
        let events: Vec<_> = RawOplParser::new(&data[..])
            .into_events()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.last(), Some(&Event::End { time: 90 }));
    }

    #[test]
    fn empty_dump_only_ends() {
        let events: Vec<_> = RawOplParser::new(Vec::new())
            .into_events()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events, vec![Event::End { time: 0 }]);
    }

    #[test]
    fn negative_time_is_an_error() {
        let mut data = [record(0, 0x20, 1), record(-5, 0x20, 2)].concat();
        // trailing garbage is ignored
        data.push(0xFF);
        let mut events = RawOplParser::new(data).into_events();
        assert_eq!(
            events.next().unwrap().unwrap(),
            Event::opl_write(0, 0x20, 1)
        );
        assert!(matches!(
            events.next(),
            Some(Err(Error::Format {
                source: FormatError::NegativeTimestamp { time: -5, index: 1 }
            }))
        ));
        assert!(events.next().is_none());
    }
}
