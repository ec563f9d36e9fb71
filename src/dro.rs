//! Implementation of the DOSBox raw OPL capture format (DRO v2.0)
//!
//! Only version 2.0 files with interleaved song data are supported.
//! Timestamps are in milliseconds.

use snafu::{ensure, OptionExt as _};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use snafu::ResultExt;
#[cfg(feature = "std")]
use std::path::Path;

use crate::data_types::{u16_le_at, u32_le_at, Ascii};
use crate::error::{
    CodemapTooLongSnafu, FormatError, InsufficientBytesSnafu, InvalidCodemapIndexSnafu,
    InvalidSignatureSnafu, Result, UnsupportedCompressionSnafu, UnsupportedFormatSnafu,
    UnsupportedVersionSnafu,
};
#[cfg(feature = "std")]
use crate::error::ReadFileSnafu;
use crate::event::Event;
use crate::registers::OPL_SECONDARY_BANK;
use crate::source::EventSource;

/// Ticks per second of DRO timestamps
pub const TIME_BASE: u32 = 1000;

/// A DRO file header
#[derive(Clone, PartialEq)]
pub struct FileHeader {
    /// `b"DBRAWOPL"` (not null-terminated)
    pub signature: [u8; 8],
    /// Major version number
    pub version_major: u16,
    /// Minor version number
    pub version_minor: u16,
}

impl FileHeader {
    /// Magic bytes at the start of every DRO file
    pub const SIGNATURE: [u8; 8] = *b"DBRAWOPL";

    /// Parse the signature and version, returning them with the rest of the input
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        ensure!(
            input.len() >= 12,
            InsufficientBytesSnafu {
                context: "DRO file header"
            }
        );

        let mut signature = [0; 8];
        signature.copy_from_slice(&input[..8]);
        ensure!(
            signature == Self::SIGNATURE,
            InvalidSignatureSnafu { format: "DRO" }
        );

        let version_major = u16_le_at(input, 8).context(InsufficientBytesSnafu {
            context: "DRO version",
        })?;
        let version_minor = u16_le_at(input, 10).context(InsufficientBytesSnafu {
            context: "DRO version",
        })?;

        Ok((
            Self {
                signature,
                version_major,
                version_minor,
            },
            &input[12..],
        ))
    }
}

impl core::fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileHeader")
            .field("signature", &Ascii(self.signature))
            .field("version_major", &self.version_major)
            .field("version_minor", &self.version_minor)
            .finish()
    }
}

/// Header that follows the file header
/// in a version 2.0 file
#[derive(Debug, Clone, PartialEq)]
pub struct V2Header {
    /// Length of the song in register/value pairs
    pub length_pairs: u32,
    /// Length of the song data in milliseconds
    pub length_ms: u32,
    /// Flag listing the hardware used in the song
    pub hardware_type: u8,
    /// Data arrangement
    pub format: u8,
    /// Compression type (0 = none, nothing else is supported)
    pub compression: u8,
    /// Command code for short delay (1..256 ms).
    ///
    /// The delay in milliseconds is calculated as
    /// `value + 1`.
    pub short_delay_code: u8,
    /// Command code for long delay (> 256 ms).
    ///
    /// The delay in milliseconds is calculated as
    /// `(value + 1) * 256`.
    pub long_delay_code: u8,
    /// Codemap table: OPL register for each register index.
    ///
    /// Holds at most 128 entries.
    pub codemap: Vec<u8>,
}

impl V2Header {
    /// Single OPL2 chip
    pub const HARDWARE_TYPE_OPL2: u8 = 0;
    /// Two OPL2 chips
    pub const HARDWARE_TYPE_DUAL_OPL2: u8 = 1;
    /// OPL3 chip
    pub const HARDWARE_TYPE_OPL3: u8 = 2;

    /// Commands and data are interleaved (default)
    pub const FORMAT_INTERLEAVED: u8 = 0;

    /// Parse the header, returning it with the rest of the input
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        ensure!(
            input.len() >= 14,
            InsufficientBytesSnafu {
                context: "DRO header (v2.0)"
            }
        );

        let length_pairs = u32_le_at(input, 0).context(InsufficientBytesSnafu {
            context: "DRO header (v2.0)",
        })?;
        let length_ms = u32_le_at(input, 4).context(InsufficientBytesSnafu {
            context: "DRO header (v2.0)",
        })?;
        let hardware_type = input[8];
        let format = input[9];
        let compression = input[10];
        let short_delay_code = input[11];
        let long_delay_code = input[12];
        let codemap_length = input[13];

        ensure!(
            codemap_length <= 128,
            CodemapTooLongSnafu {
                length: codemap_length
            }
        );

        let full_header_size = 14 + codemap_length as usize;
        let codemap = input
            .get(14..full_header_size)
            .context(InsufficientBytesSnafu {
                context: "DRO header (v2.0) codemap",
            })?
            .to_vec();

        Ok((
            Self {
                length_pairs,
                length_ms,
                hardware_type,
                format,
                compression,
                short_delay_code,
                long_delay_code,
                codemap,
            },
            &input[full_header_size..],
        ))
    }

    /// Resolve a song data register index into a 9-bit OPL register.
    ///
    /// The high bit of the index selects the secondary bank.
    pub fn register(&self, register_index: u8) -> Result<u16, FormatError> {
        let register = self
            .codemap
            .get((register_index & 0x7F) as usize)
            .copied()
            .context(InvalidCodemapIndexSnafu {
                index: register_index,
            })?;
        if register_index & 0x80 != 0 {
            Ok(register as u16 | OPL_SECONDARY_BANK)
        } else {
            Ok(register as u16)
        }
    }
}

/// A DRO v2.0 file whose song data is decoded lazily into events
#[derive(Debug, Clone)]
pub struct DroParser<B> {
    file_header: FileHeader,
    header: V2Header,
    data: B,
    data_start: usize,
}

impl DroParser<Vec<u8>> {
    /// Read a DRO file from a file in disk
    #[cfg(feature = "std")]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path).context(ReadFileSnafu)?;
        Self::new(data)
    }
}

impl<B> DroParser<B>
where
    B: AsRef<[u8]>,
{
    /// Validate the headers of the DRO data.
    ///
    /// Fails unless the data is a version 2.0 file
    /// with uncompressed, interleaved song data.
    pub fn new(data: B) -> Result<Self> {
        let input = data.as_ref();
        let (file_header, rest) = FileHeader::parse(input)?;

        if (file_header.version_major, file_header.version_minor) != (2, 0) {
            return Err(UnsupportedVersionSnafu {
                format: "DRO",
                version: (u32::from(file_header.version_major) << 16)
                    | u32::from(file_header.version_minor),
            }
            .build()
            .into());
        }

        let (header, rest) = V2Header::parse(rest)?;
        ensure!(
            header.format == V2Header::FORMAT_INTERLEAVED,
            UnsupportedFormatSnafu {
                format: header.format
            }
        );
        ensure!(
            header.compression == 0,
            UnsupportedCompressionSnafu {
                compression: header.compression
            }
        );
        log::debug!(
            "DRO v2.0: {} pairs, {} ms, hardware type {}, {} codemap entries",
            header.length_pairs,
            header.length_ms,
            header.hardware_type,
            header.codemap.len()
        );

        let data_start = input.len() - rest.len();
        Ok(Self {
            file_header,
            header,
            data,
            data_start,
        })
    }

    /// The file signature and version
    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    /// The version 2.0 header, codemap included
    pub fn header(&self) -> &V2Header {
        &self.header
    }
}

impl<B> EventSource for DroParser<B>
where
    B: AsRef<[u8]>,
{
    type Events = DroEvents<B>;

    fn time_base(&self) -> u32 {
        TIME_BASE
    }

    fn duration(&self) -> Option<u64> {
        Some(u64::from(self.header.length_ms))
    }

    fn into_events(self) -> DroEvents<B> {
        DroEvents {
            header: self.header,
            data: self.data,
            position: self.data_start,
            pairs_read: 0,
            time: 0,
            done: false,
        }
    }
}

/// Lazy iterator over the events of a DRO file
#[derive(Debug)]
pub struct DroEvents<B> {
    header: V2Header,
    data: B,
    position: usize,
    pairs_read: u32,
    time: u64,
    done: bool,
}

impl<B> DroEvents<B>
where
    B: AsRef<[u8]>,
{
    /// Decode pairs until the next register write
    /// or the end of the song data
    fn next_event(&mut self) -> Result<Event> {
        while self.pairs_read < self.header.length_pairs {
            let pair = self
                .data
                .as_ref()
                .get(self.position..self.position + 2)
                .context(InsufficientBytesSnafu {
                    context: "DRO song data",
                })?;
            let (code, value) = (pair[0], pair[1]);
            self.position += 2;
            self.pairs_read += 1;

            if code == self.header.short_delay_code {
                self.time += u64::from(value) + 1;
            } else if code == self.header.long_delay_code {
                self.time += (u64::from(value) + 1) << 8;
            } else {
                let register = self.header.register(code)?;
                return Ok(Event::opl_write(self.time, register, value));
            }
        }

        self.done = true;
        Ok(Event::End {
            time: self.time.max(u64::from(self.header.length_ms)),
        })
    }
}

impl<B> Iterator for DroEvents<B>
where
    B: AsRef<[u8]>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let event = self.next_event();
        if event.is_err() {
            self.done = true;
        }
        Some(event)
    }
}
