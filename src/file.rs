//! Opening input files and creating output files by file name extension.

use std::fs::File;
use std::io::BufWriter;
#[cfg(feature = "gzip")]
use std::io::{Cursor, Read as _, Write as _};
use std::path::Path;

use snafu::ResultExt;

use crate::dro::{DroEvents, DroParser};
use crate::error::{ReadFileSnafu, Result, UnknownExtensionSnafu, WriteFileSnafu};
use crate::event::Event;
use crate::gd3::Gd3;
use crate::raw::{RawOplEvents, RawOplParser};
use crate::source::EventSource;
use crate::vgm::{VgmEvents, VgmParser};
use crate::writer::VgmWriter;

/// First bytes of a gzip stream
#[cfg(feature = "gzip")]
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// An input file of any supported format
#[derive(Debug)]
pub enum FileSource {
    Dro(DroParser<Vec<u8>>),
    Vgm(VgmParser<Vec<u8>>),
    Raw(RawOplParser<Vec<u8>>),
}

/// Open an input file, choosing the format from its extension:
/// `.dro`, `.vgm`, `.vgz` (gzip compressed VGM) or `.opl3raw`.
pub fn open(path: impl AsRef<Path>) -> Result<FileSource> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("dro") => Ok(FileSource::Dro(DroParser::from_file(path)?)),
        Some("vgm") | Some("vgz") => {
            let data = std::fs::read(path).context(ReadFileSnafu)?;
            Ok(FileSource::Vgm(VgmParser::new(decompress(data)?)?))
        }
        Some("opl3raw") => Ok(FileSource::Raw(RawOplParser::from_file(path)?)),
        _ => UnknownExtensionSnafu {
            path: path.display().to_string(),
        }
        .fail(),
    }
}

/// Decompress gzip data, leaving anything else untouched
#[cfg(feature = "gzip")]
fn decompress(data: Vec<u8>) -> Result<Vec<u8>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(data);
    }
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(&data[..])
        .read_to_end(&mut out)
        .context(ReadFileSnafu)?;
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
fn decompress(data: Vec<u8>) -> Result<Vec<u8>> {
    Ok(data)
}

impl FileSource {
    /// The GD3 tag of a VGM file, if it has a valid one
    pub fn gd3(&self) -> Option<Gd3> {
        match self {
            FileSource::Vgm(parser) => parser.gd3().ok().flatten(),
            _ => None,
        }
    }
}

impl EventSource for FileSource {
    type Events = FileEvents;

    fn time_base(&self) -> u32 {
        match self {
            FileSource::Dro(parser) => parser.time_base(),
            FileSource::Vgm(parser) => parser.time_base(),
            FileSource::Raw(parser) => parser.time_base(),
        }
    }

    fn duration(&self) -> Option<u64> {
        match self {
            FileSource::Dro(parser) => parser.duration(),
            FileSource::Vgm(parser) => parser.duration(),
            FileSource::Raw(parser) => parser.duration(),
        }
    }

    fn into_events(self) -> FileEvents {
        match self {
            FileSource::Dro(parser) => FileEvents::Dro(parser.into_events()),
            FileSource::Vgm(parser) => FileEvents::Vgm(parser.into_events()),
            FileSource::Raw(parser) => FileEvents::Raw(parser.into_events()),
        }
    }
}

/// The events of a [`FileSource`]
#[derive(Debug)]
pub enum FileEvents {
    Dro(DroEvents<Vec<u8>>),
    Vgm(VgmEvents<Vec<u8>>),
    Raw(RawOplEvents<Vec<u8>>),
}

impl Iterator for FileEvents {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            FileEvents::Dro(events) => events.next(),
            FileEvents::Vgm(events) => events.next(),
            FileEvents::Raw(events) => events.next(),
        }
    }
}

/// A VGM output file
#[derive(Debug)]
pub enum FileWriter {
    Vgm(VgmWriter<BufWriter<File>>),
    /// Gzip compressed VGM, built in memory
    /// and compressed into the file on close
    #[cfg(feature = "gzip")]
    Vgz {
        writer: VgmWriter<Cursor<Vec<u8>>>,
        file: File,
    },
}

/// Create an output file, choosing the format from its extension:
/// `.vgm`, or `.vgz` for gzip compressed VGM.
pub fn create(path: impl AsRef<Path>) -> Result<FileWriter> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("vgm") => {
            let file = File::create(path).context(WriteFileSnafu)?;
            Ok(FileWriter::Vgm(VgmWriter::new(BufWriter::new(file))?))
        }
        #[cfg(feature = "gzip")]
        Some("vgz") => {
            let file = File::create(path).context(WriteFileSnafu)?;
            Ok(FileWriter::Vgz {
                writer: VgmWriter::new(Cursor::new(Vec::new()))?,
                file,
            })
        }
        _ => UnknownExtensionSnafu {
            path: path.display().to_string(),
        }
        .fail(),
    }
}

impl FileWriter {
    /// Ticks per second of the events accepted by the file
    pub fn time_base(&self) -> u32 {
        crate::writer::TIME_BASE
    }

    /// Set the metadata to append to the file
    pub fn set_gd3(&mut self, gd3: Gd3) {
        match self {
            FileWriter::Vgm(writer) => writer.set_gd3(gd3),
            #[cfg(feature = "gzip")]
            FileWriter::Vgz { writer, .. } => writer.set_gd3(gd3),
        }
    }

    /// Append an event, see [`VgmWriter::write`]
    pub fn write(&mut self, event: &Event) -> Result<()> {
        match self {
            FileWriter::Vgm(writer) => writer.write(event),
            #[cfg(feature = "gzip")]
            FileWriter::Vgz { writer, .. } => writer.write(event),
        }
    }

    /// Finish the file
    pub fn close(self) -> Result<()> {
        match self {
            FileWriter::Vgm(writer) => {
                writer.close()?;
            }
            #[cfg(feature = "gzip")]
            FileWriter::Vgz { writer, file } => {
                let data = writer.close()?.into_inner();
                let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::best());
                encoder.write_all(&data).context(WriteFileSnafu)?;
                encoder.finish().context(WriteFileSnafu)?;
            }
        }
        Ok(())
    }
}
