//! Error types shared by the parsers and the writer.

use snafu::Snafu;

/// The input data does not follow a supported format.
///
/// These errors are always fatal:
/// a parser that yields one stops producing events.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum FormatError {
    /// Insufficient bytes to parse {context}
    InsufficientBytes { context: &'static str },
    /// Invalid {format} signature
    InvalidSignature { format: &'static str },
    /// Unsupported {format} version {version:#06x}
    UnsupportedVersion { format: &'static str, version: u32 },
    /// Unsupported DRO format {format} (only interleaved data is supported)
    UnsupportedFormat { format: u8 },
    /// Unsupported DRO compression type {compression}
    UnsupportedCompression { compression: u8 },
    /// DRO codemap of {length} entries is too long
    CodemapTooLong { length: u8 },
    /// Register index {index:#04x} is outside of the codemap
    InvalidCodemapIndex { index: u8 },
    /// Unsupported VGM command {code:#04x} at offset {offset:#x}
    UnknownCommand { code: u8, offset: usize },
    /// The register engine reports an unsupported time base
    UnsupportedTimeBase,
    /// Negative timestamp {time} in raw OPL record #{index}
    NegativeTimestamp { time: i64, index: usize },
}

/// An error reading, converting or writing an event stream
#[cfg(feature = "std")]
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Failed to read the file
    ReadFile { source: std::io::Error },
    /// Failed to write the file
    WriteFile { source: std::io::Error },
    /// Invalid input data
    #[snafu(context(false))]
    Format { source: FormatError },
    /// Event at time {time} precedes an earlier event at time {previous}
    Ordering { time: u64, previous: u64 },
    /// Stream duration of {duration} ticks does not fit in a VGM header
    DurationOverflow { duration: u64 },
    /// Unrecognised file extension in {path}
    UnknownExtension { path: String },
}

/// An error reading or converting an event stream
#[cfg(not(feature = "std"))]
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Invalid input data
    #[snafu(context(false))]
    Format { source: FormatError },
}

/// Result type of this crate
pub type Result<T, E = Error> = core::result::Result<T, E>;
