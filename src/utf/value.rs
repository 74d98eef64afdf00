//! Typed cell values.

use std::borrow::Cow;
use std::fmt;

use crate::afs2::{Archive, AFS2_MAGIC};
use crate::util::{Error, Result, ValueType};

use super::{Table, UTF_MAGIC};

/// A string stored in the string heap.
///
/// The raw bytes are kept exactly as read so that legacy-encoded tables
/// round-trip unchanged; [`HeapString::text`] decodes on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HeapString {
    bytes: Vec<u8>,
}

impl HeapString {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Text view (lossy for non-UTF-8 bytes).
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for HeapString {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<String> for HeapString {
    fn from(s: String) -> Self {
        Self::from_bytes(s.into_bytes())
    }
}

impl PartialEq<str> for HeapString {
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for HeapString {
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl fmt::Display for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Decoded content of a blob cell.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum BlobPayload {
    /// Zero-length blob
    #[default]
    Empty,
    /// Opaque bytes
    Bytes(Vec<u8>),
    /// Nested @UTF table
    Table(Box<Table>),
    /// Nested AFS2 archive (full or header-only)
    Archive(Box<Archive>),
}

/// A blob cell: payload plus any zero slack that followed a nested
/// structure inside the stored byte range.
#[derive(Clone, Debug, Default)]
pub struct Blob {
    payload: BlobPayload,
    slack: u32,
    /// Offset stored for an empty blob; carries no content.
    empty_offset: u32,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.slack == other.slack
    }
}

impl Blob {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap raw bytes. An empty vector yields an empty blob.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self { payload: BlobPayload::Bytes(bytes), ..Self::default() }
        }
    }

    pub fn from_table(table: Table) -> Self {
        Self { payload: BlobPayload::Table(Box::new(table)), ..Self::default() }
    }

    pub fn from_archive(archive: Archive) -> Self {
        Self { payload: BlobPayload::Archive(Box::new(archive)), ..Self::default() }
    }

    pub(crate) fn with_layout(payload: BlobPayload, slack: u32, empty_offset: u32) -> Self {
        Self { payload, slack, empty_offset }
    }

    #[inline]
    pub fn payload(&self) -> &BlobPayload {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut BlobPayload {
        &mut self.payload
    }

    /// Zero bytes kept after a nested table or archive.
    #[inline]
    pub fn slack(&self) -> u32 {
        self.slack
    }

    #[inline]
    pub(crate) fn empty_offset(&self) -> u32 {
        self.empty_offset
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.payload, BlobPayload::Empty)
    }

    /// Raw bytes, when the payload is opaque.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            BlobPayload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.payload {
            BlobPayload::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.payload {
            BlobPayload::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn archive(&self) -> Option<&Archive> {
        match &self.payload {
            BlobPayload::Archive(a) => Some(a),
            _ => None,
        }
    }

    pub fn archive_mut(&mut self) -> Option<&mut Archive> {
        match &mut self.payload {
            BlobPayload::Archive(a) => Some(a),
            _ => None,
        }
    }

    /// First four bytes of the stored payload, if it has that many.
    pub fn tag(&self) -> Option<[u8; 4]> {
        match &self.payload {
            BlobPayload::Empty => None,
            BlobPayload::Table(_) => Some(*UTF_MAGIC),
            BlobPayload::Archive(_) => Some(*AFS2_MAGIC),
            BlobPayload::Bytes(b) => b.get(..4).and_then(|t| t.try_into().ok()),
        }
    }

    /// Serialize the payload followed by its slack.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = match &self.payload {
            BlobPayload::Empty => Vec::new(),
            BlobPayload::Bytes(b) => b.clone(),
            BlobPayload::Table(t) => t.to_bytes()?,
            BlobPayload::Archive(a) => a.to_bytes()?,
        };
        out.resize(out.len() + self.slack as usize, 0);
        Ok(out)
    }
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    String(HeapString),
    Blob(Blob),
    Guid([u8; 16]),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::U8(_) => ValueType::U8,
            Self::I8(_) => ValueType::I8,
            Self::U16(_) => ValueType::U16,
            Self::I16(_) => ValueType::I16,
            Self::U32(_) => ValueType::U32,
            Self::I32(_) => ValueType::I32,
            Self::U64(_) => ValueType::U64,
            Self::I64(_) => ValueType::I64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
            Self::String(_) => ValueType::String,
            Self::Blob(_) => ValueType::Blob,
            Self::Guid(_) => ValueType::Guid,
        }
    }

    /// The zero value of a type: 0, empty string, empty blob, nil GUID.
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::U8 => Self::U8(0),
            ValueType::I8 => Self::I8(0),
            ValueType::U16 => Self::U16(0),
            ValueType::I16 => Self::I16(0),
            ValueType::U32 => Self::U32(0),
            ValueType::I32 => Self::I32(0),
            ValueType::U64 => Self::U64(0),
            ValueType::I64 => Self::I64(0),
            ValueType::F32 => Self::F32(0.0),
            ValueType::F64 => Self::F64(0.0),
            ValueType::String => Self::String(HeapString::default()),
            ValueType::Blob => Self::Blob(Blob::empty()),
            ValueType::Guid => Self::Guid([0; 16]),
        }
    }

    pub fn string(s: &str) -> Self {
        Self::String(HeapString::from(s))
    }

    pub fn bytes(b: Vec<u8>) -> Self {
        Self::Blob(Blob::from_bytes(b))
    }

    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::U8(v) => v as i128,
            Self::I8(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::U64(v) => v as i128,
            Self::I64(v) => v as i128,
            _ => return None,
        })
    }

    /// Integer value as u64; `None` for non-integers and negative values.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&HeapString> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_blob_mut(&mut self) -> Option<&mut Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to the field type `ty`.
    ///
    /// Integers convert between widths and signedness when the value fits;
    /// every other combination must already match.
    pub fn coerce(self, ty: ValueType) -> Result<Self> {
        if self.value_type() == ty {
            return Ok(self);
        }
        let mismatch = || Error::TypeMismatch { expected: ty.name(), actual: self.value_type().name() };
        let v = match self.as_i128() {
            Some(v) if ty.is_integer() => v,
            _ => return Err(mismatch()),
        };
        let out = match ty {
            ValueType::U8 => u8::try_from(v).ok().map(Self::U8),
            ValueType::I8 => i8::try_from(v).ok().map(Self::I8),
            ValueType::U16 => u16::try_from(v).ok().map(Self::U16),
            ValueType::I16 => i16::try_from(v).ok().map(Self::I16),
            ValueType::U32 => u32::try_from(v).ok().map(Self::U32),
            ValueType::I32 => i32::try_from(v).ok().map(Self::I32),
            ValueType::U64 => u64::try_from(v).ok().map(Self::U64),
            ValueType::I64 => i64::try_from(v).ok().map(Self::I64),
            _ => None,
        };
        out.ok_or_else(mismatch)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{}", v),
            Self::I8(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::Blob(b) => match b.payload() {
                BlobPayload::Empty => f.write_str("<empty>"),
                BlobPayload::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
                BlobPayload::Table(t) => write!(f, "<table {}>", t.name()),
                BlobPayload::Archive(a) => write!(f, "<archive, {} entries>", a.len()),
            },
            Self::Guid(g) => {
                for b in g {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integers() {
        assert_eq!(Value::U64(7).coerce(ValueType::U16).unwrap(), Value::U16(7));
        assert_eq!(Value::I32(-1).coerce(ValueType::I8).unwrap(), Value::I8(-1));
        assert!(Value::U64(70000).coerce(ValueType::U16).is_err());
        assert!(Value::I8(-1).coerce(ValueType::U32).is_err());
    }

    #[test]
    fn test_coerce_non_integer() {
        assert!(Value::string("x").coerce(ValueType::U8).is_err());
        assert!(Value::U8(1).coerce(ValueType::String).is_err());
        assert!(Value::F32(1.0).coerce(ValueType::F32).is_ok());
    }

    #[test]
    fn test_blob_tag() {
        assert_eq!(Blob::empty().tag(), None);
        assert_eq!(Blob::from_bytes(vec![1, 2, 3]).tag(), None);
        assert_eq!(Blob::from_bytes(b"HCA\0rest".to_vec()).tag(), Some(*b"HCA\0"));
        assert!(Blob::from_bytes(Vec::new()).is_empty());
    }

    #[test]
    fn test_heap_string() {
        let s = HeapString::from("Synth");
        assert_eq!(s, "Synth");
        assert_eq!(s.text(), "Synth");
        let sjis = HeapString::from_bytes(vec![0x83, 0x65]);
        assert_eq!(sjis.as_bytes(), &[0x83, 0x65]);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::I16(5).as_u64(), Some(5));
        assert_eq!(Value::I16(-5).as_u64(), None);
        assert_eq!(Value::F32(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::zero(ValueType::Blob), Value::Blob(Blob::empty()));
    }
}
