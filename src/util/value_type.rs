//! Value types - the column storage types of @UTF tables.

use std::fmt;

/// Column value type, stored in the low nibble of a field's flag byte.
///
/// Integer and float types have a fixed slot width. Strings occupy a 4-byte
/// string-heap offset, blobs an 8-byte (offset, length) pair into the blob
/// heap, and GUIDs 16 raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// Unsigned 8-bit integer
    U8 = 0,
    /// Signed 8-bit integer
    I8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Signed 16-bit integer
    I16 = 3,
    /// Unsigned 32-bit integer
    U32 = 4,
    /// Signed 32-bit integer
    I32 = 5,
    /// Unsigned 64-bit integer
    U64 = 6,
    /// Signed 64-bit integer
    I64 = 7,
    /// 32-bit IEEE float
    F32 = 8,
    /// 64-bit IEEE float
    F64 = 9,
    /// NUL-terminated string in the string heap
    String = 10,
    /// Byte range in the blob heap
    Blob = 11,
    /// 16-byte GUID stored inline
    Guid = 12,
}

impl ValueType {
    /// Width in bytes of this type's slot in a row or default value.
    #[inline]
    pub const fn slot_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            Self::String => 4,
            Self::Blob => 8,
            Self::Guid => 16,
        }
    }

    /// Returns the name of this type as a string.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::U64 => "uint64",
            Self::I64 => "int64",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::String => "string",
            Self::Blob => "data",
            Self::Guid => "guid",
        }
    }

    /// Convert from the 4-bit type tag.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::U8),
            1 => Some(Self::I8),
            2 => Some(Self::U16),
            3 => Some(Self::I16),
            4 => Some(Self::U32),
            5 => Some(Self::I32),
            6 => Some(Self::U64),
            7 => Some(Self::I64),
            8 => Some(Self::F32),
            9 => Some(Self::F64),
            10 => Some(Self::String),
            11 => Some(Self::Blob),
            12 => Some(Self::Guid),
            _ => None,
        }
    }

    /// True for the eight integer types.
    #[inline]
    pub const fn is_integer(self) -> bool {
        (self as u8) <= Self::I64 as u8
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
