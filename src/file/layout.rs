//! Binary layout conventions shared by the catalog, table and index files.
//!
//! All multi-byte integers are little-endian `u32`. Offsets are plain `u32`
//! handles where `0` means "none"; the high bit of a link word marks the
//! entry as deleted and the remaining bits still hold the link.

/// High bit of a link word: the entry is deleted
pub const TOMBSTONE: u32 = 0x8000_0000;

/// Mask recovering the link from a tombstoned word
pub const OFFSET_MASK: u32 = 0x7FFF_FFFF;

/// The null offset
pub const NULL_OFFSET: u32 = 0;

/// Width of every fixed-size name field, including the terminating NUL
pub const NAME_LENGTH: usize = 64;

/// Magic word stored in each file header identifying its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    Catalog = 0x7ACA,
    Table = 0xB17A,
    Index = 0xE81D,
}

impl FileType {
    pub fn word(self) -> u32 {
        self as u32
    }

    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            0x7ACA => Some(FileType::Catalog),
            0xB17A => Some(FileType::Table),
            0xE81D => Some(FileType::Index),
            _ => None,
        }
    }
}

#[inline]
pub fn is_tombstoned(word: u32) -> bool {
    word & TOMBSTONE != 0
}

/// Link carried by a word regardless of its tombstone bit
#[inline]
pub fn link_of(word: u32) -> u32 {
    word & OFFSET_MASK
}

#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Append a name as a NUL-padded `NAME_LENGTH` field, truncating if needed
pub fn put_name(buf: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_LENGTH - 1);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + NAME_LENGTH - len, 0);
}

/// Read a NUL-padded name field starting at `offset`
pub fn get_name(buf: &[u8], offset: usize) -> String {
    let field = &buf[offset..offset + NAME_LENGTH];
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_keeps_link() {
        let word = 4096 | TOMBSTONE;
        assert!(is_tombstoned(word));
        assert_eq!(link_of(word), 4096);
        assert!(!is_tombstoned(4096));
    }

    #[test]
    fn test_name_field_round_trip() {
        let mut buf = Vec::new();
        put_name(&mut buf, "students");
        assert_eq!(buf.len(), NAME_LENGTH);
        assert_eq!(get_name(&buf, 0), "students");
    }

    #[test]
    fn test_long_name_is_truncated() {
        let long = "x".repeat(100);
        let mut buf = Vec::new();
        put_name(&mut buf, &long);
        assert_eq!(buf.len(), NAME_LENGTH);
        assert_eq!(get_name(&buf, 0).len(), NAME_LENGTH - 1);
    }

    #[test]
    fn test_file_type_words() {
        assert_eq!(FileType::from_word(0xB17A), Some(FileType::Table));
        assert_eq!(FileType::Index.word(), 0xE81D);
        assert_eq!(FileType::from_word(0), None);
    }
}
