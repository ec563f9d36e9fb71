//! Helper module for OPL and OPM register addresses

use core::fmt;
use core::ops::RangeInclusive;

use crate::event::Event;

/// Bank select bit of a 9-bit OPL register address (OPL3 secondary bank)
pub const OPL_SECONDARY_BANK: u16 = 0x100;

/// Test LSI / Enable waveform control
pub const OPL_TEST_LSI: u16 = 0x01;

/// Speech synthesis mode / Keyboard split note select
pub const OPL_NOTE_SELECT: u16 = 0x08;

/// Key On / Block / Frequency (high 2 bits), one register per channel
pub const OPL_KEY_ON_BLOCK_FNUM_RANGE: RangeInclusive<u8> = 0xB0..=0xB8;

/// Key on flag in the `0xB0..=0xB8` registers
pub const OPL_KEY_ON_BIT: u8 = 0x20;

/// AM depth / Vibrato depth / Rhythm control
pub const OPL_AM_VIBRATO_RHYTHM: u16 = 0xBD;

/// OPL3 four-operator connection select
pub const OPL3_CONNECTION_SELECT: u16 = 0x104;

/// OPL3 mode enable ("NEW" bit)
pub const OPL3_MODE: u16 = 0x105;

/// OPM key on register: slot mask in bits 3-6, channel in bits 0-2
pub const OPM_KEY_ON: u8 = 0x08;

/// Channel bits of an OPM key on write
pub const OPM_KEY_ON_CHANNEL_MASK: u8 = 0x07;

/// Number of OPM channels
pub const OPM_CHANNELS: u8 = 8;

/// Check whether an OPL register write (either bank) turns a note on
pub fn is_opl_key_on(register: u16, value: u8) -> bool {
    OPL_KEY_ON_BLOCK_FNUM_RANGE.contains(&(register as u8)) && value & OPL_KEY_ON_BIT != 0
}

/// Check whether an OPM register write is a key on write
pub fn is_opm_key_on(register: u8) -> bool {
    register == OPM_KEY_ON
}

/// Check whether the event starts a note on either chip family
pub fn is_key_on(event: &Event) -> bool {
    match *event {
        Event::OplWrite {
            register, value, ..
        } => is_opl_key_on(register, value),
        Event::OpmWrite { register, .. } => is_opm_key_on(register),
        _ => false,
    }
}

/// Rewrite a key on write into the equivalent key off write.
///
/// Any other event is returned unchanged.
pub fn key_off(event: Event) -> Event {
    match event {
        Event::OplWrite {
            time,
            register,
            value,
        } if is_opl_key_on(register, value) => Event::OplWrite {
            time,
            register,
            value: value & !OPL_KEY_ON_BIT,
        },
        Event::OpmWrite {
            time,
            register,
            value,
        } if is_opm_key_on(register) => Event::OpmWrite {
            time,
            register,
            value: value & OPM_KEY_ON_CHANNEL_MASK,
        },
        event => event,
    }
}

/// Check whether the given 9-bit OPL register address is valid
pub fn is_valid_opl_register(register: u16) -> bool {
    let secondary = register & OPL_SECONDARY_BANK != 0;
    match register as u8 {
        0x01..=0x04 | 0x08 if !secondary => true,
        0x04 | 0x05 if secondary => true,
        0xBD if !secondary => true,
        r if (0x20..=0x35).contains(&r) => true,
        r if (0x40..=0x55).contains(&r) => true,
        r if (0x60..=0x75).contains(&r) => true,
        r if (0x80..=0x95).contains(&r) => true,
        r if (0xA0..=0xA8).contains(&r) => true,
        r if (0xB0..=0xB8).contains(&r) => true,
        r if (0xC0..=0xC8).contains(&r) => true,
        r if (0xE0..=0xF5).contains(&r) => true,
        _ => false,
    }
}

/// Operator slot (0..36) addressed by an OPL operator register offset,
/// where the offset is the register minus the base of its group
/// (e.g. `0x20`), bank bit included.
pub fn opl_slot(offset: u16) -> Option<u8> {
    let slot = match offset & 0xFF {
        o @ 0x00..=0x05 => o as u8,
        o @ 0x08..=0x0D => o as u8 - 2,
        o @ 0x10..=0x15 => o as u8 - 4,
        _ => return None,
    };
    if offset & OPL_SECONDARY_BANK != 0 {
        Some(slot + 18)
    } else {
        Some(slot)
    }
}

/// Channel (0..18) addressed by an OPL channel register offset,
/// bank bit included.
pub fn opl_channel(offset: u16) -> u8 {
    if offset & OPL_SECONDARY_BANK != 0 {
        (offset as u8) + 9
    } else {
        offset as u8
    }
}

/// Human readable decoding of an OPL register write
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DescribeOpl {
    pub register: u16,
    pub value: u8,
}

impl fmt::Display for DescribeOpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let register = self.register & 0x1FF;
        let val = self.value;
        let slot = |base: u16| opl_slot(register - base).map_or(0, |s| s + 1);
        match register & 0xFF {
            _ if !is_valid_opl_register(register) => f.write_str("(unused register)"),
            _ if register == OPL_NOTE_SELECT => write!(f, "NOTE SEL: {:b}", (val >> 6) & 1),
            _ if register == OPL3_CONNECTION_SELECT => {
                write!(f, "CONNECTION SEL: {:06b}", val & 0x3F)
            }
            _ if register == OPL3_MODE => write!(f, "NEW: {:b}", val & 1),
            _ if register == OPL_AM_VIBRATO_RHYTHM => write!(
                f,
                "DAM: {:b} DVB: {:b} RYT: {:b} BD: {:b} SD: {:b} TOM: {:b} TC: {:b} HH: {:b}",
                val >> 7,
                (val >> 6) & 1,
                (val >> 5) & 1,
                (val >> 4) & 1,
                (val >> 3) & 1,
                (val >> 2) & 1,
                (val >> 1) & 1,
                val & 1
            ),
            0x20..=0x35 => write!(
                f,
                "Slot: {:2} AM: {:b} VIB: {:b} EGT: {:b} KSR: {:b} MULT: {:x}",
                slot(0x20),
                val >> 7,
                (val >> 6) & 1,
                (val >> 5) & 1,
                (val >> 4) & 1,
                val & 0x0F
            ),
            0x40..=0x55 => write!(
                f,
                "Slot: {:2} KSL: {:x} TL: {:x}",
                slot(0x40),
                val >> 6,
                val & 0x3F
            ),
            0x60..=0x75 => write!(
                f,
                "Slot: {:2} AR: {:x} DR: {:x}",
                slot(0x60),
                val >> 4,
                val & 0x0F
            ),
            0x80..=0x95 => write!(
                f,
                "Slot: {:2} SL: {:x} RR: {:x}",
                slot(0x80),
                val >> 4,
                val & 0x0F
            ),
            0xA0..=0xA8 => write!(
                f,
                "Channel: {:2} F number (L): {:x}",
                opl_channel(register - 0xA0) + 1,
                val
            ),
            0xB0..=0xB8 => write!(
                f,
                "KEY {} Channel: {:2} BLOCK: {:x} F number (H): {:x}",
                if val & OPL_KEY_ON_BIT != 0 { "ON, " } else { "OFF," },
                opl_channel(register - 0xB0) + 1,
                (val >> 2) & 0x07,
                val & 0x03
            ),
            0xC0..=0xC8 => write!(
                f,
                "Channel: {:2} CHD: {:b} CHC: {:b} CHB: {:b} CHA: {:b} FB: {:x} CNT: {:b}",
                opl_channel(register - 0xC0) + 1,
                val >> 7,
                (val >> 6) & 1,
                (val >> 5) & 1,
                (val >> 4) & 1,
                (val >> 1) & 0x07,
                val & 1
            ),
            0xE0..=0xF5 => write!(f, "Slot: {:2} WS: {:x}", slot(0xE0), val & 0x07),
            _ => Ok(()),
        }
    }
}

/// Human readable decoding of an OPM register write
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DescribeOpm {
    pub register: u8,
    pub value: u8,
}

impl fmt::Display for DescribeOpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = self.register;
        let val = self.value;
        match reg {
            OPM_KEY_ON => write!(
                f,
                "Channel: {} Slot: {:04b}",
                val & OPM_KEY_ON_CHANNEL_MASK,
                (val & 0x78) >> 3
            ),
            0x0F => write!(
                f,
                "Noise Enable: {:b} Frequency: {:2x}",
                val >> 7,
                val & 0x1F
            ),
            0x10 => write!(f, "CLKA1: {:02x}", val),
            0x11 => write!(f, "CLKA2: {:x}", val & 0x03),
            0x12 => write!(f, "CLKB: {:02x}", val),
            0x20..=0x27 => write!(
                f,
                "Channel: {} Left: {:b} Right: {:b} Feedback: {:x} Connection: {:x}",
                reg - 0x20,
                val >> 7,
                (val >> 6) & 1,
                (val & 0x38) >> 3,
                val & 0x07
            ),
            0x28..=0x2F => write!(
                f,
                "Channel: {} Octave: {:x} Note: {:x}",
                reg - 0x28,
                (val & 0x70) >> 4,
                val & 0x0F
            ),
            0x30..=0x37 => write!(f, "Channel: {} Key Fraction: {:2x}", reg - 0x30, val >> 2),
            0x38..=0x3F => write!(
                f,
                "Channel: {} PMS: {:x} AMS: {:x}",
                reg - 0x38,
                (val & 0x70) >> 4,
                val & 0x03
            ),
            0x40..=0x5F => write!(
                f,
                "Slot: {} Detune 1: {:x} Mult: {:x}",
                reg - 0x40,
                (val & 0x70) >> 4,
                val & 0x0F
            ),
            0x60..=0x7F => write!(f, "Slot: {} Level: {:2x}", reg - 0x60, val & 0x7F),
            0x80..=0x9F => write!(
                f,
                "Slot: {} Key Scaling: {:x} Attack: {:2x}",
                reg - 0x80,
                val >> 6,
                val & 0x1F
            ),
            0xA0..=0xBF => write!(
                f,
                "Slot: {} AM Enabled: {:b} Decay 1: {:2x}",
                reg - 0xA0,
                val >> 7,
                val & 0x1F
            ),
            0xC0..=0xDF => write!(
                f,
                "Slot: {} Detune 2: {:x} Decay 2: {:2x}",
                reg - 0xC0,
                val >> 6,
                val & 0x1F
            ),
            0xE0..=0xFF => write!(
                f,
                "Slot: {} Decay 1 Level: {:x} Release: {:x}",
                reg - 0xE0,
                val >> 4,
                val & 0x0F
            ),
            _ => Ok(()),
        }
    }
}
