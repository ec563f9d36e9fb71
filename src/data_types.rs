//! Byte-level helpers shared by the format modules.

use core::fmt::Write as _;

/// Read a little-endian `u16` at the given offset
pub(crate) fn u16_le_at(bytes: &[u8], offset: usize) -> Option<u16> {
    let data = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([data[0], data[1]]))
}

/// Read a little-endian `u32` at the given offset
pub(crate) fn u32_le_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let data = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}

/// Read a little-endian `i64` at the given offset
pub(crate) fn i64_le_at(bytes: &[u8], offset: usize) -> Option<i64> {
    let data = bytes.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0; 8];
    buf.copy_from_slice(data);
    Some(i64::from_le_bytes(buf))
}

/// Display an array of bytes as ASCII text
pub(crate) struct Ascii<T>(pub T);

impl<T> core::fmt::Debug for Ascii<T>
where
    T: AsRef<[u8]>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_char('"')?;
        core::fmt::Display::fmt(self, f)?;
        f.write_char('"')?;
        Ok(())
    }
}

impl<T> core::fmt::Display for Ascii<T>
where
    T: AsRef<[u8]>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for &byte in self.0.as_ref() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02X}", byte)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{i64_le_at, u16_le_at, u32_le_at, Ascii};

    #[test]
    fn reads_little_endian_integers() {
        let bytes = [0x34, 0x12, 0x78, 0x56, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(u16_le_at(&bytes, 0), Some(0x1234));
        assert_eq!(u32_le_at(&bytes, 0), Some(0x5678_1234));
        assert_eq!(i64_le_at(&bytes, 2), Some(-0xA988));
        assert_eq!(u16_le_at(&bytes, 9), None);
        assert_eq!(u32_le_at(&bytes, 7), None);
        assert_eq!(u32_le_at(&bytes, usize::MAX), None);
    }

    #[test]
    fn displays_ascii() {
        assert_eq!(format!("{:?}", Ascii(b"Vgm ")), "\"Vgm \"");
        assert_eq!(format!("{}", Ascii([b'D', 0x00])), "D\\x00");
    }
}
