//! @UTF table format constants and flag packing.

use crate::util::{Error, Result, ValueType};

/// Magic bytes at the start of every @UTF table.
pub const UTF_MAGIC: &[u8; 4] = b"@UTF";

/// Size of the fixed table header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Offsets stored in the header are relative to this position
/// (just past the magic and the table-size field).
pub const OFFSET_BASE: usize = 8;

/// The table end is zero-padded to this boundary.
pub const TABLE_ALIGN: u64 = 4;

/// Storage flag: the field carries a name-string offset.
pub const FLAG_NAME: u8 = 0x10;

/// Storage flag: the field carries one shared default value.
pub const FLAG_DEFAULT: u8 = 0x20;

/// Storage flag: the field has a slot in every row.
pub const FLAG_ROW: u8 = 0x40;

/// Mask for the value type tag.
pub const TYPE_MASK: u8 = 0x0F;

/// Text encoding of the string heap, stored in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// Legacy Shift-JIS
    ShiftJis,
    /// UTF-8
    #[default]
    Utf8,
}

impl TextEncoding {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::ShiftJis),
            1 => Ok(Self::Utf8),
            _ => Err(Error::format(format!("unknown text encoding {}", v))),
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::ShiftJis => 0,
            Self::Utf8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ShiftJis => "shift-jis",
            Self::Utf8 => "utf-8",
        }
    }
}

/// Decoded field flag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldFlags {
    pub value_type: ValueType,
    pub has_name: bool,
    pub has_default: bool,
    pub per_row: bool,
}

impl FieldFlags {
    /// Unpack a flag byte. Fails on an unknown type tag.
    pub fn unpack(byte: u8) -> Result<Self> {
        let value_type = ValueType::from_u8(byte & TYPE_MASK)
            .ok_or_else(|| Error::format(format!("unknown value type tag {}", byte & TYPE_MASK)))?;
        Ok(Self {
            value_type,
            has_name: byte & FLAG_NAME != 0,
            has_default: byte & FLAG_DEFAULT != 0,
            per_row: byte & FLAG_ROW != 0,
        })
    }

    pub fn pack(self) -> u8 {
        let mut byte = self.value_type as u8;
        if self.has_name {
            byte |= FLAG_NAME;
        }
        if self.has_default {
            byte |= FLAG_DEFAULT;
        }
        if self.per_row {
            byte |= FLAG_ROW;
        }
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_packing() {
        // Named, per-row u16.
        let f = FieldFlags::unpack(0x52).unwrap();
        assert_eq!(f.value_type, ValueType::U16);
        assert!(f.has_name && f.per_row && !f.has_default);
        assert_eq!(f.pack(), 0x52);

        // Named string with a default.
        let f = FieldFlags::unpack(0x3A).unwrap();
        assert_eq!(f.value_type, ValueType::String);
        assert!(f.has_default && !f.per_row);
    }

    #[test]
    fn test_unknown_type_tag() {
        assert!(FieldFlags::unpack(0x5D).is_err());
    }

    #[test]
    fn test_encoding() {
        assert_eq!(TextEncoding::from_u8(0).unwrap(), TextEncoding::ShiftJis);
        assert_eq!(TextEncoding::Utf8.as_u8(), 1);
        assert!(TextEncoding::from_u8(2).is_err());
    }
}
