//! GD3 metadata tags, appended after the VGM command data.
//!
//! A GD3 block is the signature `b"Gd3 "`,
//! a little-endian `u32` version (`0x100`),
//! a little-endian `u32` data length in bytes,
//! and 11 null-terminated UTF-16LE strings.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use snafu::{ensure, OptionExt as _};

use crate::data_types::u32_le_at;
use crate::error::{FormatError, InsufficientBytesSnafu, InvalidSignatureSnafu};

/// Textual metadata of a VGM file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Gd3 {
    pub track_name_en: String,
    pub track_name_jp: String,
    pub game_name_en: String,
    pub game_name_jp: String,
    pub system_name_en: String,
    pub system_name_jp: String,
    pub author_en: String,
    pub author_jp: String,
    pub release_date: String,
    /// Person who ripped or converted the music
    pub converter: String,
    pub notes: String,
}

impl Gd3 {
    /// Magic bytes of the tag
    pub const SIGNATURE: [u8; 4] = *b"Gd3 ";
    /// Tag version written and accepted
    pub const VERSION: u32 = 0x100;

    /// All fields in the order they are stored
    pub fn fields(&self) -> [&str; 11] {
        [
            &self.track_name_en,
            &self.track_name_jp,
            &self.game_name_en,
            &self.game_name_jp,
            &self.system_name_en,
            &self.system_name_jp,
            &self.author_en,
            &self.author_jp,
            &self.release_date,
            &self.converter,
            &self.notes,
        ]
    }

    fn fields_mut(&mut self) -> [&mut String; 11] {
        [
            &mut self.track_name_en,
            &mut self.track_name_jp,
            &mut self.game_name_en,
            &mut self.game_name_jp,
            &mut self.system_name_en,
            &mut self.system_name_jp,
            &mut self.author_en,
            &mut self.author_jp,
            &mut self.release_date,
            &mut self.converter,
            &mut self.notes,
        ]
    }

    /// Whether all fields are empty
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|field| field.is_empty())
    }

    /// Encode the complete GD3 block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut strings = Vec::new();
        for field in self.fields() {
            for unit in field.encode_utf16() {
                strings.extend_from_slice(&unit.to_le_bytes());
            }
            strings.extend_from_slice(&[0, 0]);
        }

        let mut out = Vec::with_capacity(12 + strings.len());
        out.extend_from_slice(&Self::SIGNATURE);
        out.extend_from_slice(&Self::VERSION.to_le_bytes());
        out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&strings);
        out
    }

    /// Parse a GD3 block starting at the beginning of `input`.
    ///
    /// Missing trailing strings are left empty.
    pub fn parse(input: &[u8]) -> Result<Self, FormatError> {
        ensure!(
            input.len() >= 12,
            InsufficientBytesSnafu {
                context: "GD3 header"
            }
        );
        ensure!(
            input[..4] == Self::SIGNATURE,
            InvalidSignatureSnafu { format: "GD3" }
        );
        let length = u32_le_at(input, 8).context(InsufficientBytesSnafu {
            context: "GD3 header",
        })? as usize;
        let strings = input
            .get(12..12usize.saturating_add(length))
            .context(InsufficientBytesSnafu {
                context: "GD3 strings",
            })?;

        let mut gd3 = Gd3::default();
        let mut units = strings
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        for field in gd3.fields_mut() {
            let string = units.by_ref().take_while(|&unit| unit != 0);
            field.extend(
                char::decode_utf16(string).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
        }
        Ok(gd3)
    }
}

#[cfg(test)]
mod tests {
    use super::Gd3;
    use crate::error::FormatError;

    #[test]
    fn encodes_fields_in_order() {
        let gd3 = Gd3 {
            track_name_en: "A".into(),
            notes: "z".into(),
            ..Gd3::default()
        };
        let bytes = gd3.to_bytes();
        assert_eq!(&bytes[..8], b"Gd3 \x00\x01\x00\x00");
        // "A\0" + 9 empty strings + "z\0"
        let strings_len = 4 + 9 * 2 + 4;
        assert_eq!(&bytes[8..12], &(strings_len as u32).to_le_bytes());
        assert_eq!(bytes.len(), 12 + strings_len);
        assert_eq!(&bytes[12..16], &[b'A', 0, 0, 0]);
        assert_eq!(&bytes[bytes.len() - 4..], &[b'z', 0, 0, 0]);
    }

    #[test]
    fn parses_what_it_encodes() {
        let gd3 = Gd3 {
            track_name_en: "Title".into(),
            track_name_jp: "タイトル".into(),
            game_name_en: "Game".into(),
            system_name_en: "PC".into(),
            release_date: "1993".into(),
            converter: "fm2vgm".into(),
            ..Gd3::default()
        };
        assert!(!gd3.is_empty());
        assert_eq!(Gd3::parse(&gd3.to_bytes()), Ok(gd3));
        assert!(Gd3::default().is_empty());
    }

    #[test]
    fn rejects_bad_blocks() {
        assert_eq!(
            Gd3::parse(b"Gd4 \x00\x01\x00\x00\x00\x00\x00\x00"),
            Err(FormatError::InvalidSignature { format: "GD3" })
        );
        assert!(matches!(
            Gd3::parse(b"Gd3 \x00\x01\x00\x00\x10\x00\x00\x00"),
            Err(FormatError::InsufficientBytes { .. })
        ));
    }
}
