//! Register write streams of Yamaha FM sound chips.
//!
//! This crate reads music captured as OPL2, OPL3 and OPM register writes,
//! turns it into a single stream of timed [`Event`]s,
//! transforms the stream and writes it out as a VGM file.
//! A quick overview of the modules:
//!
//! - `event`: the event stream model
//! - `source`: the [`EventSource`] trait implemented by all parsers
//! - `dro`: [DOSBox Raw OPL (DRO) v2][dro] file parser
//! - `vgm`: [Video Game Music][vgm] header model and file parser (OPL and OPM commands)
//! - `gd3`: VGM metadata tags
//! - `raw`: raw OPL register dump parser
//! - `engine`: sources driven by tracker and MIDI synthesis engines
//! - `transform`: stream transformations (trimming, optimisation, loop detection, ...)
//! - `pipeline`: conversion settings applying the transforms in order
//! - `writer`: VGM file writer
//! - `device`: driving chips from a stream
//! - `file`: opening and creating files by extension
//! - `registers`, `state`, `time`: chip register and time base helpers
//!
//! ```no_run
//! use fmstream::{file, EventSource, ConvertOptions};
//!
//! # fn main() -> fmstream::Result<()> {
//! let source = file::open("song.dro")?;
//! let mut output = file::create("song.vgz")?;
//! let options = ConvertOptions {
//!     optimise: true,
//!     key_off: true,
//!     ..ConvertOptions::default()
//! };
//! let src = source.time_base();
//! for event in options.apply(source.into_events(), src, output.time_base()) {
//!     output.write(&event?)?;
//! }
//! output.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! [dro]: https://moddingwiki.shikadi.net/wiki/DRO_Format
//! [vgm]: https://vgmrips.net/wiki/VGM_Specification
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub(crate) mod data_types;
#[cfg(feature = "std")]
pub mod device;
pub mod dro;
pub mod engine;
pub mod error;
pub mod event;
#[cfg(feature = "std")]
pub mod file;
pub mod gd3;
pub mod pipeline;
pub mod raw;
pub mod registers;
pub mod source;
pub mod state;
pub mod time;
pub mod transform;
pub mod vgm;
#[cfg(feature = "std")]
pub mod writer;

pub use crate::error::{Error, FormatError, Result};
pub use crate::event::Event;
pub use crate::gd3::Gd3;
pub use crate::pipeline::{ConvertOptions, LoopMode};
pub use crate::source::EventSource;
pub use crate::transform::EventStreamExt;
#[cfg(feature = "std")]
pub use crate::writer::VgmWriter;
