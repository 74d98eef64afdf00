//! @UTF table parsing.
//!
//! Every offset the stream declares is checked against the position the
//! reader reaches by walking the layout in order; padding must be zero.

use std::collections::{HashMap, HashSet};

use byteorder::BigEndian;
use tracing::{debug, trace};

use crate::afs2::{Archive, AFS2_MAGIC};
use crate::util::{
    align_up, alignment_candidates, check_zero, infer_alignment, smallest_alignment, ByteReader,
    Error, Result, ValueType, ANY_ALIGNMENT,
};

use super::{
    Blob, BlobPayload, Field, FieldFlags, FieldStorage, HeapLayout, HeapString, Table,
    TextEncoding, Value, HEADER_SIZE, OFFSET_BASE, TABLE_ALIGN, UTF_MAGIC,
};

type Reader<'a> = ByteReader<'a, BigEndian>;

/// A value slot before heap references are resolved.
enum RawSlot {
    Inline(Value),
    Str(u32),
    Blob { offset: u32, len: u32 },
}

struct RawField {
    name: Option<u32>,
    value_type: ValueType,
    default: Option<RawSlot>,
    per_row: bool,
}

fn read_slot(r: &mut Reader<'_>, ty: ValueType) -> Result<RawSlot> {
    Ok(RawSlot::Inline(match ty {
        ValueType::U8 => Value::U8(r.u8()?),
        ValueType::I8 => Value::I8(r.i8()?),
        ValueType::U16 => Value::U16(r.u16()?),
        ValueType::I16 => Value::I16(r.i16()?),
        ValueType::U32 => Value::U32(r.u32()?),
        ValueType::I32 => Value::I32(r.i32()?),
        ValueType::U64 => Value::U64(r.u64()?),
        ValueType::I64 => Value::I64(r.i64()?),
        ValueType::F32 => Value::F32(r.f32()?),
        ValueType::F64 => Value::F64(r.f64()?),
        ValueType::Guid => {
            let mut g = [0u8; 16];
            g.copy_from_slice(r.take(16)?);
            Value::Guid(g)
        }
        ValueType::String => return Ok(RawSlot::Str(r.u32()?)),
        ValueType::Blob => {
            let offset = r.u32()?;
            let len = r.u32()?;
            return Ok(RawSlot::Blob { offset, len });
        }
    }))
}

/// Sequential string-heap walker.
struct StringHeap<'a> {
    data: &'a [u8],
    start: usize,
    cursor: usize,
    seen: HashMap<u32, HeapString>,
    contents: HashSet<Vec<u8>>,
    repeated: bool,
    pooled: bool,
}

impl<'a> StringHeap<'a> {
    fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            start,
            cursor: start,
            seen: HashMap::new(),
            contents: HashSet::new(),
            repeated: false,
            pooled: false,
        }
    }

    /// Resolve the next string reference in heap order.
    fn next(&mut self, offset: u32) -> Result<HeapString> {
        let at = self.start + offset as usize;
        if at == self.cursor {
            let mut r = Reader::new(self.data);
            r.seek(at)?;
            let s = HeapString::from_bytes(r.cstring()?);
            self.cursor = r.pos();
            if !self.contents.insert(s.as_bytes().to_vec()) {
                self.repeated = true;
            }
            self.seen.insert(offset, s.clone());
            return Ok(s);
        }
        if at < self.cursor {
            if let Some(s) = self.seen.get(&offset) {
                self.pooled = true;
                return Ok(s.clone());
            }
        }
        Err(Error::OffsetMismatch {
            what: "string",
            stored: offset as u64,
            computed: (self.cursor - self.start) as u64,
        })
    }
}

/// Sequential blob-heap walker; intersects the alignments each gap allows.
struct BlobHeap<'a> {
    data: &'a [u8],
    start: usize,
    cursor: u64,
    aligns: u16,
}

impl BlobHeap<'_> {
    fn next(&mut self, offset: u32, len: u32) -> Result<Blob> {
        if len == 0 {
            return Ok(Blob::with_layout(BlobPayload::Empty, 0, offset));
        }
        let rel = offset as u64;
        if rel < self.cursor {
            return Err(Error::OffsetMismatch { what: "blob", stored: rel, computed: self.cursor });
        }
        self.aligns &= alignment_candidates(self.cursor, rel);
        if self.aligns == 0 {
            return Err(Error::OffsetMismatch { what: "blob", stored: rel, computed: self.cursor });
        }
        let gap_start = self.start + self.cursor as usize;
        let at = self.start + offset as usize;
        let end = at
            .checked_add(len as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| Error::UnexpectedEof(at.saturating_add(len as usize) as u64))?;
        check_zero(&self.data[gap_start..at], gap_start as u64)?;
        self.cursor = rel + len as u64;
        parse_blob(&self.data[at..end], at as u64)
    }
}

/// Decode a blob's bytes, recognizing nested tables and archives by tag.
fn parse_blob(bytes: &[u8], base: u64) -> Result<Blob> {
    let (payload, used) = match bytes.get(..4) {
        Some(tag) if tag == UTF_MAGIC => {
            let (table, used) = parse_prefix(bytes)?;
            (BlobPayload::Table(Box::new(table)), used)
        }
        Some(tag) if tag == AFS2_MAGIC => {
            let (archive, used) = Archive::parse_prefix(bytes)?;
            (BlobPayload::Archive(Box::new(archive)), used)
        }
        _ => return Ok(Blob::from_bytes(bytes.to_vec())),
    };
    check_zero(&bytes[used..], base + used as u64)?;
    Ok(Blob::with_layout(payload, (bytes.len() - used) as u32, 0))
}

impl Table {
    /// Parse a table that spans exactly `data`.
    pub fn parse(data: &[u8]) -> Result<Table> {
        let (table, used) = parse_prefix(data)?;
        if used != data.len() {
            check_zero(&data[used..], used as u64)
                .map_err(|_| Error::format(format!("{} bytes after table end", data.len() - used)))?;
            debug!(extra = data.len() - used, "zero bytes after table end");
        }
        Ok(table)
    }
}

/// Parse a table at the start of `data`; returns the table and the number
/// of bytes it occupies (header size field plus eight).
pub fn parse_prefix(data: &[u8]) -> Result<(Table, usize)> {
    let mut r = Reader::new(data);
    let magic = r.take(4)?;
    if magic != UTF_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(Error::InvalidMagic { expected: "@UTF", found });
    }
    let table_size = r.u32()? as usize;
    let total = OFFSET_BASE + table_size;
    if total > data.len() {
        return Err(Error::UnexpectedEof(total as u64));
    }
    let data = &data[..total];
    let mut r = Reader::new(data);
    r.seek(OFFSET_BASE)?;

    let reserved = r.u8()?;
    if reserved != 0 {
        return Err(Error::format(format!("reserved header byte is {}", reserved)));
    }
    let encoding = TextEncoding::from_u8(r.u8()?)?;
    let row_offset = r.u16()? as usize;
    let strings_offset = r.u32()? as usize;
    let data_offset = r.u32()? as usize;
    let name_offset = r.u32()?;
    let column_count = r.u16()? as usize;
    let row_length = r.u16()? as usize;
    let row_count = r.u32()? as usize;
    debug_assert_eq!(r.pos(), HEADER_SIZE);

    // Field descriptors
    let mut raw_fields = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let flags = FieldFlags::unpack(r.u8()?)?;
        if flags.has_default && flags.per_row {
            return Err(Error::format("field has both a default and per-row storage"));
        }
        let name = if flags.has_name { Some(r.u32()?) } else { None };
        let default = if flags.has_default { Some(read_slot(&mut r, flags.value_type)?) } else { None };
        raw_fields.push(RawField { name, value_type: flags.value_type, default, per_row: flags.per_row });
    }

    // Row block
    if r.pos() != OFFSET_BASE + row_offset {
        return Err(Error::OffsetMismatch {
            what: "row block",
            stored: row_offset as u64,
            computed: (r.pos() - OFFSET_BASE) as u64,
        });
    }
    let width: usize = raw_fields
        .iter()
        .filter(|f| f.per_row)
        .map(|f| f.value_type.slot_size())
        .sum();
    if width != row_length {
        if row_count > 0 {
            return Err(Error::OffsetMismatch {
                what: "row width",
                stored: row_length as u64,
                computed: width as u64,
            });
        }
        debug!(stored = row_length, computed = width, "row width mismatch on empty table");
    }
    let mut raw_rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Vec::with_capacity(column_count);
        for f in &raw_fields {
            row.push(if f.per_row { Some(read_slot(&mut r, f.value_type)?) } else { None });
        }
        raw_rows.push(row);
    }

    // String heap
    let strings_start = OFFSET_BASE + strings_offset;
    let data_start = OFFSET_BASE + data_offset;
    if data_start > total || strings_start > data_start {
        return Err(Error::format("heap offsets out of order"));
    }
    let string_heap_align = infer_alignment("string heap", r.pos() as u64, strings_start as u64)?;
    check_zero(&data[r.pos()..strings_start], r.pos() as u64)?;

    let mut strings = StringHeap::new(&data[..data_start], strings_start);
    let name = strings.next(name_offset)?;
    let mut field_names = Vec::with_capacity(column_count);
    let mut default_strings = Vec::with_capacity(column_count);
    for f in &raw_fields {
        field_names.push(f.name.map(|off| strings.next(off)).transpose()?);
        default_strings.push(match f.default {
            Some(RawSlot::Str(off)) => Some(strings.next(off)?),
            _ => None,
        });
    }
    let mut row_strings: Vec<Vec<Option<HeapString>>> = Vec::with_capacity(row_count);
    for row in &raw_rows {
        let mut out = Vec::with_capacity(column_count);
        for slot in row {
            out.push(match slot {
                Some(RawSlot::Str(off)) => Some(strings.next(*off)?),
                _ => None,
            });
        }
        row_strings.push(out);
    }
    if strings.pooled && strings.repeated {
        return Err(Error::format("string heap mixes shared and repeated strings"));
    }
    let pooled_strings = strings.pooled;
    let strings_end = strings.cursor;

    // Blob heap
    let blob_heap_align = infer_alignment("blob heap", strings_end as u64, data_start as u64)?;
    check_zero(&data[strings_end..data_start], strings_end as u64)?;

    let mut blobs = BlobHeap { data, start: data_start, cursor: 0, aligns: ANY_ALIGNMENT };
    let mut default_blobs = Vec::with_capacity(column_count);
    for f in &raw_fields {
        default_blobs.push(match f.default {
            Some(RawSlot::Blob { offset, len }) => Some(blobs.next(offset, len)?),
            _ => None,
        });
    }
    let mut row_blobs: Vec<Vec<Option<Blob>>> = Vec::with_capacity(row_count);
    for row in &raw_rows {
        let mut out = Vec::with_capacity(column_count);
        for slot in row {
            out.push(match slot {
                Some(RawSlot::Blob { offset, len }) => Some(blobs.next(*offset, *len)?),
                _ => None,
            });
        }
        row_blobs.push(out);
    }
    let blob_align = smallest_alignment(blobs.aligns).unwrap_or(1);
    let end = data_start + blobs.cursor as usize;

    let padded = align_up(end as u64, TABLE_ALIGN) as usize;
    if padded != total {
        return Err(Error::OffsetMismatch {
            what: "table size",
            stored: table_size as u64,
            computed: (padded - OFFSET_BASE) as u64,
        });
    }
    check_zero(&data[end..padded], end as u64)?;

    // Assemble
    let mut fields = Vec::with_capacity(column_count);
    for (i, f) in raw_fields.iter_mut().enumerate() {
        let storage = match f.default.take() {
            Some(slot) => FieldStorage::Defaulted(resolve(slot, &mut default_strings[i], &mut default_blobs[i])?),
            None if f.per_row => FieldStorage::PerRow,
            None => FieldStorage::Absent,
        };
        fields.push(Field::new(field_names[i].take(), f.value_type, storage)?);
    }
    let mut rows = Vec::with_capacity(row_count);
    for (r, raw) in raw_rows.into_iter().enumerate() {
        let mut row = Vec::with_capacity(column_count);
        for (i, slot) in raw.into_iter().enumerate() {
            row.push(match slot {
                Some(slot) => Some(resolve(slot, &mut row_strings[r][i], &mut row_blobs[r][i])?),
                None => None,
            });
        }
        rows.push(row);
    }

    let layout = HeapLayout { string_heap_align, blob_heap_align, blob_align, pooled_strings };
    trace!(table = %name, rows = row_count, columns = column_count, ?layout, "parsed table");
    Ok((Table::from_parts(name, encoding, fields, rows, layout), total))
}

fn resolve(slot: RawSlot, string: &mut Option<HeapString>, blob: &mut Option<Blob>) -> Result<Value> {
    match slot {
        RawSlot::Inline(v) => Ok(v),
        RawSlot::Str(_) => string.take().map(Value::String).ok_or_else(|| Error::format("unresolved string")),
        RawSlot::Blob { .. } => blob.take().map(Value::Blob).ok_or_else(|| Error::format("unresolved blob")),
    }
}
