//! VGM file reading and header encoding
//!
//! Only the OPL2 (YM3812), OPL3 (YMF262) and OPM (YM2151) commands
//! of VGM version 1.50 or later are supported.
//! Timestamps are in samples at 44100 Hz.

use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;
#[cfg(feature = "std")]
use std::path::Path;

use snafu::{ensure, OptionExt as _};
#[cfg(feature = "std")]
use snafu::ResultExt;

use crate::data_types::{u16_le_at, u32_le_at, Ascii};
use crate::error::{
    FormatError, InsufficientBytesSnafu, InvalidSignatureSnafu, Result, UnknownCommandSnafu,
    UnsupportedVersionSnafu,
};
#[cfg(feature = "std")]
use crate::error::ReadFileSnafu;
use crate::event::Event;
use crate::gd3::Gd3;
use crate::registers::OPL_SECONDARY_BANK;
use crate::source::EventSource;

/// Ticks per second of VGM timestamps
pub const TIME_BASE: u32 = 44_100;

/// Typical YM3812 (OPL2) input clock in Hz
pub const YM3812_CLOCK: u32 = 3_579_545;
/// Typical YMF262 (OPL3) input clock in Hz
pub const YMF262_CLOCK: u32 = 14_318_180;
/// Typical YM2151 (OPM) input clock in Hz
pub const YM2151_CLOCK: u32 = 3_579_545;

/// VGM command codes used by this crate
pub mod command {
    /// YM2151 write: register, value
    pub const YM2151_WRITE: u8 = 0x54;
    /// YM3812 write: register, value
    pub const YM3812_WRITE: u8 = 0x5A;
    /// YMF262 port 0 write: register, value
    pub const YMF262_PORT0_WRITE: u8 = 0x5E;
    /// YMF262 port 1 write: register, value
    pub const YMF262_PORT1_WRITE: u8 = 0x5F;
    /// Wait n samples (16-bit little-endian operand)
    pub const WAIT: u8 = 0x61;
    /// Wait 735 samples (1/60 s)
    pub const WAIT_735: u8 = 0x62;
    /// Wait 882 samples (1/50 s)
    pub const WAIT_882: u8 = 0x63;
    /// End of sound data
    pub const END_OF_DATA: u8 = 0x66;
    /// Wait n+1 samples, n in the low nibble (`0x70..=0x7F`)
    pub const SMALL_WAIT: u8 = 0x70;
}

/// Header fields of a VGM file relevant to FM music.
///
/// Offsets stored in the header are relative to the position of the field itself;
/// the `*_BASE` constants give those positions.
#[derive(Clone, PartialEq)]
pub struct VgmHeader {
    /// "Vgm " ident
    pub ident: [u8; 4],
    /// Relative offset to end of file (i.e. file length - 4)
    pub eof_offset: u32,
    /// Version number in BCD-Code (e.g. `0x151` for 1.51)
    pub version: u32,
    /// Relative offset to the GD3 tag, or 0 if there is none
    ///
    /// Address: `0x14`
    pub gd3_offset: u32,
    /// Total of all wait values in the file
    ///
    /// Address: `0x18`
    pub total_samples: u32,
    /// Relative offset to the loop point, or 0 if no loop
    ///
    /// Address: `0x1C`
    pub loop_offset: u32,
    /// Number of samples in one loop, or 0 if there is no loop
    ///
    /// Address: `0x20`
    pub loop_samples: u32,
    /// Input clock rate in Hz for the YM2151 chip, 0 if unused
    ///
    /// Address: `0x30`
    pub ym2151_clock: u32,
    /// Relative offset to the VGM data stream
    ///
    /// Address: `0x34`
    pub data_offset: u32,
    /// Input clock rate in Hz for the YM3812 chip, 0 if unused
    ///
    /// Address: `0x50`
    pub ym3812_clock: u32,
    /// Input clock rate in Hz for the YMF262 chip, 0 if unused
    ///
    /// Address: `0x5C`
    pub ymf262_clock: u32,
}

impl VgmHeader {
    /// Magic bytes at the start of every VGM file
    pub const IDENT: [u8; 4] = *b"Vgm ";
    /// Size of the header written by this crate
    pub const SIZE: usize = 256;
    /// Version written by this crate
    pub const VERSION: u32 = 0x151;
    /// Oldest version which can be read
    pub const MIN_VERSION: u32 = 0x150;

    /// Positions that the header offsets are relative to
    pub const EOF_OFFSET_BASE: u32 = 0x04;
    pub const GD3_OFFSET_BASE: u32 = 0x14;
    pub const LOOP_OFFSET_BASE: u32 = 0x1C;
    pub const DATA_OFFSET_BASE: u32 = 0x34;

    /// A header for a file written by this crate,
    /// with its data starting right after the 256 header bytes.
    pub fn new() -> Self {
        VgmHeader {
            ident: Self::IDENT,
            eof_offset: 0,
            version: Self::VERSION,
            gd3_offset: 0,
            total_samples: 0,
            loop_offset: 0,
            loop_samples: 0,
            ym2151_clock: 0,
            data_offset: Self::SIZE as u32 - Self::DATA_OFFSET_BASE,
            ym3812_clock: 0,
            ymf262_clock: 0,
        }
    }

    /// Parse and validate the header at the start of a VGM file
    pub fn parse(input: &[u8]) -> Result<Self, FormatError> {
        ensure!(
            input.len() >= 0x40,
            InsufficientBytesSnafu {
                context: "VGM header"
            }
        );
        let mut ident = [0; 4];
        ident.copy_from_slice(&input[..4]);
        ensure!(ident == Self::IDENT, InvalidSignatureSnafu { format: "VGM" });

        let field = |offset| u32_le_at(input, offset).unwrap_or(0);
        let version = field(0x08);
        ensure!(
            version >= Self::MIN_VERSION,
            UnsupportedVersionSnafu {
                format: "VGM",
                version
            }
        );

        let mut header = VgmHeader {
            ident,
            eof_offset: field(0x04),
            version,
            gd3_offset: field(0x14),
            total_samples: field(0x18),
            loop_offset: field(0x1C),
            loop_samples: field(0x20),
            ym2151_clock: field(0x30),
            data_offset: field(0x34),
            ym3812_clock: 0,
            ymf262_clock: 0,
        };

        let header_end = header
            .data_start()
            .filter(|&start| start <= input.len())
            .context(InsufficientBytesSnafu {
                context: "VGM command data",
            })?;
        // clocks past the start of the data are not part of the header
        let header_field = |offset: usize| {
            if offset + 4 <= header_end {
                field(offset)
            } else {
                0
            }
        };
        header.ym3812_clock = header_field(0x50);
        header.ymf262_clock = header_field(0x5C);

        Ok(header)
    }

    /// Absolute position of the first VGM command,
    /// or `None` if the offset does not fit in the address space
    pub fn data_start(&self) -> Option<usize> {
        match self.data_offset {
            0 => Some(0x40),
            offset => absolute(Self::DATA_OFFSET_BASE, offset),
        }
    }

    /// Absolute position of the end of the file,
    /// or `None` if the offset does not fit in the address space
    pub fn end(&self) -> Option<usize> {
        absolute(Self::EOF_OFFSET_BASE, self.eof_offset)
    }

    /// Absolute position of the loop point, if the file loops
    pub fn loop_start(&self) -> Option<usize> {
        if self.loop_offset != 0 && self.loop_samples != 0 {
            absolute(Self::LOOP_OFFSET_BASE, self.loop_offset)
        } else {
            None
        }
    }

    /// Absolute position of the GD3 tag, if there is one
    /// and its offset fits in the address space
    pub fn gd3_start(&self) -> Option<usize> {
        if self.gd3_offset != 0 {
            absolute(Self::GD3_OFFSET_BASE, self.gd3_offset)
        } else {
            None
        }
    }

    /// Encode the header into its 256 byte representation
    pub fn encode(&self) -> [u8; 256] {
        let mut header = [0; 256];
        header[..4].copy_from_slice(&self.ident);
        header[0x04..0x08].copy_from_slice(&self.eof_offset.to_le_bytes());
        header[0x08..0x0C].copy_from_slice(&self.version.to_le_bytes());
        header[0x14..0x18].copy_from_slice(&self.gd3_offset.to_le_bytes());
        header[0x18..0x1C].copy_from_slice(&self.total_samples.to_le_bytes());
        header[0x1C..0x20].copy_from_slice(&self.loop_offset.to_le_bytes());
        header[0x20..0x24].copy_from_slice(&self.loop_samples.to_le_bytes());
        header[0x30..0x34].copy_from_slice(&self.ym2151_clock.to_le_bytes());
        header[0x34..0x38].copy_from_slice(&self.data_offset.to_le_bytes());
        header[0x50..0x54].copy_from_slice(&self.ym3812_clock.to_le_bytes());
        header[0x5C..0x60].copy_from_slice(&self.ymf262_clock.to_le_bytes());
        header
    }
}

/// Turn a header offset relative to `base` into a file position
fn absolute(base: u32, offset: u32) -> Option<usize> {
    usize::try_from(offset)
        .ok()?
        .checked_add(usize::try_from(base).ok()?)
}

impl Default for VgmHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VgmHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VgmHeader")
            .field("ident", &Ascii(&self.ident))
            .field("eof_offset", &self.eof_offset)
            .field("version", &format_args!("{:#x}", self.version))
            .field("gd3_offset", &self.gd3_offset)
            .field("total_samples", &self.total_samples)
            .field("loop_offset", &self.loop_offset)
            .field("loop_samples", &self.loop_samples)
            .field("ym2151_clock", &self.ym2151_clock)
            .field("data_offset", &self.data_offset)
            .field("ym3812_clock", &self.ym3812_clock)
            .field("ymf262_clock", &self.ymf262_clock)
            .finish()
    }
}

/// A VGM file whose commands are decoded lazily into events
#[derive(Debug, Clone)]
pub struct VgmParser<B> {
    header: VgmHeader,
    /// Position of the first command, within the data
    data_start: usize,
    data: B,
}

impl VgmParser<Vec<u8>> {
    /// Read an uncompressed VGM file from a file in disk
    #[cfg(feature = "std")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path).context(ReadFileSnafu)?;
        Self::new(data)
    }
}

impl<B> VgmParser<B>
where
    B: AsRef<[u8]>,
{
    /// Validate the header of the VGM data
    pub fn new(data: B) -> Result<Self> {
        let header = VgmHeader::parse(data.as_ref())?;
        log::debug!("VGM header: {:?}", header);
        let data_start = header.data_start().context(InsufficientBytesSnafu {
            context: "VGM command data",
        })?;
        Ok(Self {
            header,
            data_start,
            data,
        })
    }

    /// The validated file header
    pub fn header(&self) -> &VgmHeader {
        &self.header
    }

    /// Parse the GD3 tag of the file, if it has one
    pub fn gd3(&self) -> Result<Option<Gd3>, FormatError> {
        if self.header.gd3_offset == 0 {
            return Ok(None);
        }
        let input = self
            .header
            .gd3_start()
            .and_then(|start| self.data.as_ref().get(start..))
            .context(InsufficientBytesSnafu { context: "GD3 tag" })?;
        Gd3::parse(input).map(Some)
    }
}

impl<B> EventSource for VgmParser<B>
where
    B: AsRef<[u8]>,
{
    type Events = VgmEvents<B>;

    fn time_base(&self) -> u32 {
        TIME_BASE
    }

    fn duration(&self) -> Option<u64> {
        Some(u64::from(self.header.total_samples))
    }

    fn into_events(self) -> VgmEvents<B> {
        let len = self.data.as_ref().len();
        // an end offset past the data, or beyond addressing, is clamped
        let end = match self.header.eof_offset {
            0 => len,
            _ => self.header.end().map_or(len, |end| end.min(len)),
        };
        let loop_point = self.header.loop_start().map(|offset| LoopPoint {
            offset,
            samples: u64::from(self.header.loop_samples),
        });
        if let Some(point) = &loop_point {
            log::debug!(
                "VGM loop at offset {:#x}, {} samples long",
                point.offset,
                point.samples
            );
        }

        VgmEvents {
            position: self.data_start,
            end,
            total_samples: u64::from(self.header.total_samples),
            data: self.data,
            time: 0,
            loop_point,
            loop_start_time: None,
            loop_done: false,
            pending: VecDeque::with_capacity(3),
            done: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct LoopPoint {
    offset: usize,
    samples: u64,
}

/// Lazy iterator over the events of a VGM file.
///
/// When the header declares a loop,
/// a `Marker` with index 0 is produced at the loop offset
/// and a `JumpToMarker` to index 0 once a full loop has elapsed.
#[derive(Debug)]
pub struct VgmEvents<B> {
    data: B,
    position: usize,
    end: usize,
    total_samples: u64,
    time: u64,
    loop_point: Option<LoopPoint>,
    loop_start_time: Option<u64>,
    loop_done: bool,
    pending: VecDeque<Event>,
    done: bool,
}

impl<B> VgmEvents<B>
where
    B: AsRef<[u8]>,
{
    /// Decode one command, queueing the events it produces
    fn step(&mut self) -> Result<()> {
        if self.position >= self.end {
            self.finish();
            return Ok(());
        }

        if let Some(point) = self.loop_point {
            if self.loop_start_time.is_none() && self.position == point.offset {
                self.loop_start_time = Some(self.time);
                self.pending.push_back(Event::Marker {
                    time: self.time,
                    index: 0,
                });
            }
        }

        let data = self.data.as_ref();
        let offset = self.position;
        let code = data[offset];
        let operands = |count: usize| {
            data.get(offset + 1..offset + 1 + count)
                .filter(|_| offset + 1 + count <= self.end)
                .context(InsufficientBytesSnafu {
                    context: "VGM command operands",
                })
        };

        match code {
            command::YM3812_WRITE | command::YMF262_PORT0_WRITE => {
                let op = operands(2)?;
                self.pending
                    .push_back(Event::opl_write(self.time, u16::from(op[0]), op[1]));
                self.position += 3;
            }
            command::YMF262_PORT1_WRITE => {
                let op = operands(2)?;
                self.pending.push_back(Event::opl_write(
                    self.time,
                    u16::from(op[0]) | OPL_SECONDARY_BANK,
                    op[1],
                ));
                self.position += 3;
            }
            command::YM2151_WRITE => {
                let op = operands(2)?;
                self.pending
                    .push_back(Event::opm_write(self.time, op[0], op[1]));
                self.position += 3;
            }
            command::WAIT => {
                operands(2)?;
                let samples = u16_le_at(data, offset + 1).unwrap_or(0);
                self.time += u64::from(samples);
                self.position += 3;
            }
            command::WAIT_735 => {
                self.time += 735;
                self.position += 1;
            }
            command::WAIT_882 => {
                self.time += 882;
                self.position += 1;
            }
            command::END_OF_DATA => {
                self.position += 1;
                self.finish();
                return Ok(());
            }
            0x70..=0x7F => {
                self.time += u64::from(code & 0x0F) + 1;
                self.position += 1;
            }
            code => return Err(UnknownCommandSnafu { code, offset }.build().into()),
        }

        if let (Some(point), Some(start)) = (self.loop_point, self.loop_start_time) {
            if !self.loop_done && self.time >= start + point.samples {
                self.loop_done = true;
                self.pending.push_back(Event::JumpToMarker {
                    time: start + point.samples,
                    index: 0,
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending.push_back(Event::End {
            time: self.time.max(self.total_samples),
        });
    }
}

impl<B> Iterator for VgmEvents<B>
where
    B: AsRef<[u8]>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.step() {
                self.done = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{VgmHeader, VgmParser, TIME_BASE};
    use crate::error::{Error, FormatError};
    use crate::event::Event;
    use crate::source::EventSource;

    /// Build a VGM file from raw command bytes,
    /// with an optional loop at the given command data offset
    pub(crate) fn vgm_file(commands: &[u8], total_samples: u32, looping: Option<(usize, u32)>) -> Vec<u8> {
        let mut header = VgmHeader::new();
        header.total_samples = total_samples;
        header.eof_offset = (VgmHeader::SIZE + commands.len()) as u32 - 4;
        if let Some((offset, samples)) = looping {
            header.loop_offset = (VgmHeader::SIZE + offset) as u32 - VgmHeader::LOOP_OFFSET_BASE;
            header.loop_samples = samples;
        }
        let mut out = header.encode().to_vec();
        out.extend_from_slice(commands);
        out
    }

    fn events(data: &[u8]) -> Result<Vec<Event>, Error> {
        VgmParser::new(data)?.into_events().collect()
    }

    #[test]
    fn header_round_trip() {
        let mut header = VgmHeader::new();
        header.eof_offset = 0x1234;
        header.gd3_offset = 0x1000;
        header.total_samples = 44_100;
        header.loop_offset = 0xE4;
        header.loop_samples = 735;
        header.ym3812_clock = super::YM3812_CLOCK;
        header.ym2151_clock = super::YM2151_CLOCK;

        let bytes = header.encode();
        assert_eq!(&bytes[..4], b"Vgm ");
        assert_eq!(&bytes[0x34..0x38], &[0xCC, 0, 0, 0]);
        let parsed = VgmHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.data_start(), Some(0x100));
        assert_eq!(parsed.end(), Some(0x1238));
        assert_eq!(parsed.loop_start(), Some(0x100));
        assert_eq!(parsed.gd3_start(), Some(0x1014));
    }

    #[test]
    fn decodes_chip_writes_and_waits() {
        let commands = [
            0x5A, 0x20, 0x01, // OPL2
            0x62, // 735
            0x5E, 0xB0, 0x21, // OPL3 port 0
            0x63, // 882
            0x5F, 0x05, 0x01, // OPL3 port 1
            0x61, 0x10, 0x00, // 16
            0x54, 0x08, 0x78, // OPM
            0x7F, // 16
            0x66,
        ];
        let data = vgm_file(&commands, 0, None);
        let parser = VgmParser::new(&data[..]).unwrap();
        assert_eq!(parser.time_base(), TIME_BASE);
        assert_eq!(
            parser.into_events().collect::<Result<Vec<_>, _>>().unwrap(),
            vec![
                Event::opl_write(0, 0x20, 0x01),
                Event::opl_write(735, 0xB0, 0x21),
                Event::opl_write(1617, 0x105, 0x01),
                Event::opm_write(1633, 0x08, 0x78),
                Event::End { time: 1649 },
            ]
        );
    }

    #[test]
    fn delays_account_for_every_data_byte() {
        // all delays, no writes: 3 + 1 + 1 + 1 bytes
        let commands = [0x61, 0xE8, 0x03, 0x62, 0x63, 0x70, 0x66];
        let data = vgm_file(&commands, 0, None);
        assert_eq!(
            events(&data).unwrap(),
            vec![Event::End {
                time: 1000 + 735 + 882 + 1
            }]
        );
    }

    #[test]
    fn end_time_covers_total_samples() {
        let data = vgm_file(&[0x62, 0x66], 44_100, None);
        assert_eq!(events(&data).unwrap(), vec![Event::End { time: 44_100 }]);
    }

    #[test]
    fn synthesizes_loop_events() {
        let commands = [
            0x5A, 0x20, 0x01, // intro write
            0x62, // 735
            0x5A, 0xB0, 0x21, // loop start (offset 4)
            0x63, // 882
            0x5A, 0xB0, 0x01, //
            0x63, // 882
            0x66,
        ];
        let data = vgm_file(&commands, 735 + 882 * 2, Some((4, 882 * 2)));
        assert_eq!(
            events(&data).unwrap(),
            vec![
                Event::opl_write(0, 0x20, 0x01),
                Event::Marker {
                    time: 735,
                    index: 0
                },
                Event::opl_write(735, 0xB0, 0x21),
                Event::opl_write(1617, 0xB0, 0x01),
                Event::JumpToMarker {
                    time: 2499,
                    index: 0
                },
                Event::End { time: 2499 },
            ]
        );
    }

    #[test]
    fn rejects_old_versions_and_bad_idents() {
        let mut data = vgm_file(&[0x66], 0, None);
        data[8] = 0x10;
        assert!(matches!(
            VgmParser::new(&data[..]),
            Err(Error::Format {
                source: FormatError::UnsupportedVersion { version: 0x110, .. }
            })
        ));

        let mut data = vgm_file(&[0x66], 0, None);
        data[0] = b'X';
        assert!(matches!(
            VgmParser::new(&data[..]),
            Err(Error::Format {
                source: FormatError::InvalidSignature { format: "VGM" }
            })
        ));
    }

    #[test]
    fn unknown_commands_are_fatal() {
        let data = vgm_file(&[0x62, 0x50, 0x9F, 0x66], 0, None);
        let mut events = VgmParser::new(&data[..]).unwrap().into_events();
        assert!(matches!(
            events.next(),
            Some(Err(Error::Format {
                source: FormatError::UnknownCommand {
                    code: 0x50,
                    offset: 0x101
                }
            }))
        ));
        assert!(events.next().is_none());
    }

    #[test]
    fn missing_end_of_data_still_ends() {
        let data = vgm_file(&[0x70, 0x71], 0, None);
        assert_eq!(events(&data).unwrap(), vec![Event::End { time: 3 }]);
    }

    #[test]
    fn truncated_operands_are_an_error() {
        let data = vgm_file(&[0x5A, 0x20], 0, None);
        assert!(matches!(
            events(&data),
            Err(Error::Format {
                source: FormatError::InsufficientBytes { .. }
            })
        ));
    }

    #[test]
    fn data_offset_past_the_input_is_an_error() {
        for offset in [0x1000, 0xFFFF_FFF0] {
            let mut data = vgm_file(&[0x66], 0, None);
            data[0x34..0x38].copy_from_slice(&u32::to_le_bytes(offset));
            assert!(matches!(
                VgmParser::new(&data[..]),
                Err(Error::Format {
                    source: FormatError::InsufficientBytes { .. }
                })
            ));
        }
    }

    #[test]
    fn huge_end_offset_reads_up_to_the_end_of_the_data() {
        let mut data = vgm_file(&[0x5A, 0x20, 0x01, 0x66], 0, None);
        data[0x04..0x08].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(
            events(&data).unwrap(),
            vec![Event::opl_write(0, 0x20, 0x01), Event::End { time: 0 }]
        );
    }

    #[test]
    fn huge_gd3_offset_is_an_error() {
        let mut data = vgm_file(&[0x66], 0, None);
        data[0x14..0x18].copy_from_slice(&u32::MAX.to_le_bytes());
        let parser = VgmParser::new(&data[..]).unwrap();
        assert!(matches!(
            parser.gd3(),
            Err(FormatError::InsufficientBytes { .. })
        ));
    }

    #[test]
    fn huge_loop_offset_never_loops() {
        let mut data = vgm_file(&[0x62, 0x66], 735, None);
        data[0x1C..0x20].copy_from_slice(&u32::MAX.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&735_u32.to_le_bytes());
        assert_eq!(events(&data).unwrap(), vec![Event::End { time: 735 }]);
    }
}
