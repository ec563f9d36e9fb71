//! The canonical event model.
//!
//! Every parser produces, every transform consumes and re-emits,
//! and the writer consumes a sequence of [`Event`]s.
//! All timestamps are ticks in the time base of the stream
//! (see [`EventSource::time_base`](crate::source::EventSource::time_base)).

use core::fmt;

/// Mask of the 9 valid bits of an OPL register address
pub const OPL_REGISTER_MASK: u16 = 0x1FF;

/// A single time-stamped event in a chip register stream.
///
/// Within one stream, event times never decrease,
/// and the stream is terminated by exactly one [`Event::End`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    /// Write to an OPL2/OPL3 register.
    ///
    /// Bit 8 of the register selects the OPL3 secondary bank.
    OplWrite {
        /// the time of the write in ticks
        time: u64,
        /// the 9-bit register address
        register: u16,
        /// the data to write to the register
        value: u8,
    },
    /// Write to an OPM register
    OpmWrite {
        /// the time of the write in ticks
        time: u64,
        /// the register address
        register: u8,
        /// the data to write to the register
        value: u8,
    },
    /// A structural checkpoint, usually a loop point
    Marker { time: u64, index: u32 },
    /// Loop back to a previously seen marker
    JumpToMarker { time: u64, index: u32 },
    /// End of stream, carrying the total stream duration
    End { time: u64 },
}

impl Event {
    /// Create an OPL register write,
    /// keeping only the 9 valid bits of the register address.
    pub fn opl_write(time: u64, register: u16, value: u8) -> Self {
        Event::OplWrite {
            time,
            register: register & OPL_REGISTER_MASK,
            value,
        }
    }

    /// Create an OPM register write
    pub fn opm_write(time: u64, register: u8, value: u8) -> Self {
        Event::OpmWrite {
            time,
            register,
            value,
        }
    }

    /// The time of the event in ticks
    pub fn time(&self) -> u64 {
        match *self {
            Event::OplWrite { time, .. }
            | Event::OpmWrite { time, .. }
            | Event::Marker { time, .. }
            | Event::JumpToMarker { time, .. }
            | Event::End { time } => time,
        }
    }

    /// Return the same event at a different time
    pub fn with_time(self, time: u64) -> Self {
        match self {
            Event::OplWrite {
                register, value, ..
            } => Event::OplWrite {
                time,
                register,
                value,
            },
            Event::OpmWrite {
                register, value, ..
            } => Event::OpmWrite {
                time,
                register,
                value,
            },
            Event::Marker { index, .. } => Event::Marker { time, index },
            Event::JumpToMarker { index, .. } => Event::JumpToMarker { time, index },
            Event::End { .. } => Event::End { time },
        }
    }

    /// Whether this event is a chip register write
    pub fn is_write(&self) -> bool {
        matches!(self, Event::OplWrite { .. } | Event::OpmWrite { .. })
    }

    /// Whether this event ends the stream
    pub fn is_end(&self) -> bool {
        matches!(self, Event::End { .. })
    }
}

/// Debug implementation overridden to
/// always write registers and values in hexadecimal and in a single line
impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::OplWrite {
                time,
                register,
                value,
            } => write!(
                f,
                "OplWrite {{ time: {}, register: {:#05x}, value: {:#04x} }}",
                time, register, value
            ),
            Event::OpmWrite {
                time,
                register,
                value,
            } => write!(
                f,
                "OpmWrite {{ time: {}, register: {:#04x}, value: {:#04x} }}",
                time, register, value
            ),
            Event::Marker { time, index } => {
                write!(f, "Marker {{ time: {}, index: {} }}", time, index)
            }
            Event::JumpToMarker { time, index } => {
                write!(f, "JumpToMarker {{ time: {}, index: {} }}", time, index)
            }
            Event::End { time } => write!(f, "End {{ time: {} }}", time),
        }
    }
}
