//! @UTF table serialization.
//!
//! Offsets are never taken from the model: both heaps are rebuilt from the
//! current content and every header offset is derived from them.

use std::collections::HashMap;

use byteorder::BigEndian;

use crate::util::{align_up, ByteWriter, Error, Result};

use super::{
    Blob, FieldFlags, FieldStorage, HeapLayout, HeapString, Table, Value, HEADER_SIZE,
    OFFSET_BASE, TABLE_ALIGN, UTF_MAGIC,
};

type Writer = ByteWriter<BigEndian>;

struct StringHeap {
    buf: Vec<u8>,
    pooled: bool,
    index: HashMap<Vec<u8>, u32>,
}

impl StringHeap {
    fn push(&mut self, s: &HeapString) -> Result<u32> {
        let bytes = s.as_bytes();
        if bytes.contains(&0) {
            return Err(Error::Layout(format!("string {:?} contains NUL", s.text())));
        }
        if self.pooled {
            if let Some(&off) = self.index.get(bytes) {
                return Ok(off);
            }
        }
        let off = offset_u32(self.buf.len(), "string heap")?;
        self.buf.extend_from_slice(bytes);
        self.buf.push(0);
        if self.pooled {
            self.index.insert(bytes.to_vec(), off);
        }
        Ok(off)
    }
}

struct BlobHeap {
    buf: Vec<u8>,
    align: u64,
}

impl BlobHeap {
    /// Append a blob and return its (offset, length) slot.
    fn push(&mut self, blob: &Blob) -> Result<(u32, u32)> {
        let bytes = blob.to_bytes()?;
        if bytes.is_empty() {
            return Ok((blob.empty_offset(), 0));
        }
        let at = align_up(self.buf.len() as u64, self.align) as usize;
        self.buf.resize(at, 0);
        self.buf.extend_from_slice(&bytes);
        Ok((offset_u32(at, "blob heap")?, offset_u32(bytes.len(), "blob length")?))
    }
}

fn offset_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::Layout(format!("{} exceeds 4 GiB", what)))
}

/// Heap slots of a string or blob value.
#[derive(Clone, Copy)]
enum Slot {
    None,
    Str(u32),
    Blob(u32, u32),
}

fn write_value(w: &mut Writer, value: &Value, slot: Slot) -> Result<()> {
    match (value, slot) {
        (Value::U8(v), _) => w.u8(*v),
        (Value::I8(v), _) => w.i8(*v),
        (Value::U16(v), _) => w.u16(*v),
        (Value::I16(v), _) => w.i16(*v),
        (Value::U32(v), _) => w.u32(*v),
        (Value::I32(v), _) => w.i32(*v),
        (Value::U64(v), _) => w.u64(*v),
        (Value::I64(v), _) => w.i64(*v),
        (Value::F32(v), _) => w.f32(*v),
        (Value::F64(v), _) => w.f64(*v),
        (Value::Guid(g), _) => w.bytes(g),
        (Value::String(_), Slot::Str(off)) => w.u32(off),
        (Value::Blob(_), Slot::Blob(off, len)) => {
            w.u32(off);
            w.u32(len);
        }
        _ => return Err(Error::Layout("heap slot missing for value".into())),
    }
    Ok(())
}

impl Table {
    /// Serialize to bytes, recomputing every offset.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let layout: HeapLayout = self.layout();
        let fields = self.fields();
        let rows = self.raw_rows();

        // String heap: table name, then each field's name and string
        // default, then row strings in row-major order.
        let mut strings = StringHeap { buf: Vec::new(), pooled: layout.pooled_strings, index: HashMap::new() };
        let name_offset = strings.push(self.name())?;
        let mut name_slots = Vec::with_capacity(fields.len());
        let mut default_slots = vec![Slot::None; fields.len()];
        for (i, f) in fields.iter().enumerate() {
            name_slots.push(f.name().map(|n| strings.push(n)).transpose()?);
            if let FieldStorage::Defaulted(Value::String(s)) = f.storage() {
                default_slots[i] = Slot::Str(strings.push(s)?);
            }
        }
        let mut row_slots = vec![vec![Slot::None; fields.len()]; rows.len()];
        for (r, row) in rows.iter().enumerate() {
            for (i, cell) in row.iter().enumerate() {
                if let Some(Value::String(s)) = cell {
                    row_slots[r][i] = Slot::Str(strings.push(s)?);
                }
            }
        }

        // Blob heap: defaults first, then row values.
        let mut blobs = BlobHeap { buf: Vec::new(), align: layout.blob_align.max(1) as u64 };
        for (i, f) in fields.iter().enumerate() {
            if let FieldStorage::Defaulted(Value::Blob(b)) = f.storage() {
                let (off, len) = blobs.push(b)?;
                default_slots[i] = Slot::Blob(off, len);
            }
        }
        for (r, row) in rows.iter().enumerate() {
            for (i, cell) in row.iter().enumerate() {
                if let Some(Value::Blob(b)) = cell {
                    let (off, len) = blobs.push(b)?;
                    row_slots[r][i] = Slot::Blob(off, len);
                }
            }
        }

        // Positions
        let descriptors: usize = fields
            .iter()
            .map(|f| {
                let default = match f.storage() {
                    FieldStorage::Defaulted(_) => f.value_type().slot_size(),
                    _ => 0,
                };
                1 + if f.name().is_some() { 4 } else { 0 } + default
            })
            .sum();
        let row_width: usize = fields
            .iter()
            .filter(|f| f.is_per_row())
            .map(|f| f.value_type().slot_size())
            .sum();
        let rows_start = HEADER_SIZE + descriptors;
        let rows_end = rows_start + row_width * rows.len();
        let strings_start = align_up(rows_end as u64, layout.string_heap_align.max(1) as u64) as usize;
        let strings_end = strings_start + strings.buf.len();
        let data_start = align_up(strings_end as u64, layout.blob_heap_align.max(1) as u64) as usize;
        let end = data_start + blobs.buf.len();
        let total = align_up(end as u64, TABLE_ALIGN) as usize;

        let row_offset = u16::try_from(rows_start - OFFSET_BASE)
            .map_err(|_| Error::Layout("field descriptors exceed 64 KiB".into()))?;
        let row_length = u16::try_from(row_width)
            .map_err(|_| Error::Layout(format!("row width {} exceeds 64 KiB", row_width)))?;
        let column_count = u16::try_from(fields.len())
            .map_err(|_| Error::Layout(format!("{} columns", fields.len())))?;

        let mut w = Writer::with_capacity(total);
        w.bytes(UTF_MAGIC);
        w.u32(offset_u32(total - OFFSET_BASE, "table size")?);
        w.u8(0);
        w.u8(self.encoding().as_u8());
        w.u16(row_offset);
        w.u32(offset_u32(strings_start - OFFSET_BASE, "string heap offset")?);
        w.u32(offset_u32(data_start - OFFSET_BASE, "blob heap offset")?);
        w.u32(name_offset);
        w.u16(column_count);
        w.u16(row_length);
        w.u32(offset_u32(rows.len(), "row count")?);

        for (i, f) in fields.iter().enumerate() {
            let default = f.default_value();
            let flags = FieldFlags {
                value_type: f.value_type(),
                has_name: f.name().is_some(),
                has_default: default.is_some(),
                per_row: f.is_per_row(),
            };
            w.u8(flags.pack());
            if let Some(off) = name_slots[i] {
                w.u32(off);
            }
            if let Some(v) = default {
                write_value(&mut w, v, default_slots[i])?;
            }
        }
        debug_assert_eq!(w.pos(), rows_start);

        for (r, row) in rows.iter().enumerate() {
            for (i, cell) in row.iter().enumerate() {
                if let Some(v) = cell {
                    debug_assert_eq!(v.value_type(), fields[i].value_type());
                    write_value(&mut w, v, row_slots[r][i])?;
                }
            }
        }
        w.zeros(strings_start - w.pos());
        w.bytes(&strings.buf);
        w.zeros(data_start - w.pos());
        w.bytes(&blobs.buf);
        w.zeros(total - w.pos());
        Ok(w.into_inner())
    }
}
