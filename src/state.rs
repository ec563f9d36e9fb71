//! Chip register state tracking.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::event::Event;
use crate::registers::OPL3_MODE;

/// The last value written to each chip register.
///
/// Registers which were never written have no entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisterSnapshot {
    opl: BTreeMap<u16, u8>,
    opm: BTreeMap<u8, u8>,
}

impl RegisterSnapshot {
    /// An empty snapshot, with no register written
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the effect of an event.
    ///
    /// Only register writes change the snapshot.
    pub fn update(&mut self, event: &Event) {
        match *event {
            Event::OplWrite {
                register, value, ..
            } => {
                self.opl.insert(register, value);
            }
            Event::OpmWrite {
                register, value, ..
            } => {
                self.opm.insert(register, value);
            }
            _ => {}
        }
    }

    /// The last value written to an OPL register
    pub fn opl(&self, register: u16) -> Option<u8> {
        self.opl.get(&register).copied()
    }

    /// The last value written to an OPM register
    pub fn opm(&self, register: u8) -> Option<u8> {
        self.opm.get(&register).copied()
    }

    /// Whether the event is a write of the value the register already holds
    pub fn is_redundant(&self, event: &Event) -> bool {
        match *event {
            Event::OplWrite {
                register, value, ..
            } => self.opl(register) == Some(value),
            Event::OpmWrite {
                register, value, ..
            } => self.opm(register) == Some(value),
            _ => false,
        }
    }

    /// Whether no register has been written
    pub fn is_empty(&self) -> bool {
        self.opl.is_empty() && self.opm.is_empty()
    }

    /// Forget all register values
    pub fn clear(&mut self) {
        self.opl.clear();
        self.opm.clear();
    }

    /// Write events which bring a chip into this register state,
    /// all at the given time.
    ///
    /// The OPL3 mode register comes first,
    /// as it changes how the secondary bank is interpreted.
    /// OPL registers are followed by OPM registers,
    /// each in ascending address order.
    pub fn replay(&self, time: u64) -> Vec<Event> {
        let mode = self
            .opl
            .get_key_value(&OPL3_MODE)
            .map(|(&register, &value)| Event::opl_write(time, register, value));
        let opl = self
            .opl
            .iter()
            .filter(|&(&register, _)| register != OPL3_MODE)
            .map(|(&register, &value)| Event::opl_write(time, register, value));
        let opm = self
            .opm
            .iter()
            .map(|(&register, &value)| Event::opm_write(time, register, value));
        mode.into_iter().chain(opl).chain(opm).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterSnapshot;
    use crate::event::Event;

    #[test]
    fn tracks_last_written_values() {
        let mut snapshot = RegisterSnapshot::new();
        assert!(snapshot.is_empty());

        snapshot.update(&Event::opl_write(0, 0x20, 0x01));
        snapshot.update(&Event::opl_write(1, 0x20, 0x02));
        snapshot.update(&Event::opm_write(1, 0x20, 0xC0));
        snapshot.update(&Event::Marker { time: 2, index: 0 });

        assert_eq!(snapshot.opl(0x20), Some(0x02));
        assert_eq!(snapshot.opl(0x120), None);
        assert_eq!(snapshot.opm(0x20), Some(0xC0));
        assert!(snapshot.is_redundant(&Event::opl_write(5, 0x20, 0x02)));
        assert!(!snapshot.is_redundant(&Event::opl_write(5, 0x20, 0x03)));
        assert!(!snapshot.is_redundant(&Event::opm_write(5, 0x21, 0xC0)));
        assert!(!snapshot.is_redundant(&Event::End { time: 5 }));

        snapshot.clear();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn replays_opl3_mode_first() {
        let mut snapshot = RegisterSnapshot::new();
        snapshot.update(&Event::opm_write(0, 0x08, 0x00));
        snapshot.update(&Event::opl_write(0, 0x1C0, 0x31));
        snapshot.update(&Event::opl_write(0, 0xA0, 0x44));
        snapshot.update(&Event::opl_write(0, 0x105, 0x01));

        assert_eq!(
            snapshot.replay(7),
            vec![
                Event::opl_write(7, 0x105, 0x01),
                Event::opl_write(7, 0xA0, 0x44),
                Event::opl_write(7, 0x1C0, 0x31),
                Event::opm_write(7, 0x08, 0x00),
            ]
        );
    }
}
