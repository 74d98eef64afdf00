//! Table codec tests.

use super::*;
use crate::util::{Error, Result, ValueType};

/// One per-row u16 field "A" holding 0x1234 in a table named "T".
const MINIMAL: [u8; 48] = [
    b'@', b'U', b'T', b'F', 0, 0, 0, 40, // magic, table size
    0, 1, 0, 29, // reserved, utf-8, row offset
    0, 0, 0, 32, // string heap
    0, 0, 0, 40, // blob heap
    0, 0, 0, 0, // name offset
    0, 1, 0, 2, // columns, row width
    0, 0, 0, 1, // rows
    0x52, 0, 0, 0, 2, // per-row named u16, name offset 2
    0x12, 0x34, // row 0
    0, // pad
    b'T', 0, b'A', 0, // strings
    0, 0, 0, 0, // pad
];

fn mixed_table() -> Table {
    let mut t = Table::new("Mixed");
    t.add_field(Field::per_row("Id", ValueType::U32)).unwrap();
    t.add_field(Field::per_row("Name", ValueType::String)).unwrap();
    t.add_field(Field::per_row("Gain", ValueType::F32)).unwrap();
    t.add_field(Field::per_row("Offset", ValueType::I16)).unwrap();
    t.add_field(Field::per_row("Data", ValueType::Blob)).unwrap();
    t.add_field(Field::defaulted("Label", Value::string("shared"))).unwrap();
    t.add_field(Field::defaulted("Extra", Value::bytes(vec![9, 9, 9]))).unwrap();
    t.add_field(Field::defaulted("Guid", Value::Guid([7; 16]))).unwrap();
    t.add_field(Field::absent("Missing", ValueType::U64)).unwrap();
    for i in 0..3u32 {
        t.add_row(&[
            ("Id", Value::U32(i)),
            ("Name", Value::string(&format!("row{}", i))),
            ("Gain", Value::F32(i as f32 * 0.5)),
            ("Offset", Value::I16(-(i as i16))),
            ("Data", Value::bytes(vec![i as u8; i as usize * 3])),
        ])
        .unwrap();
    }
    t
}

#[test]
fn test_serialize_minimal_layout() -> Result<()> {
    let mut t = Table::new("T");
    t.add_field(Field::per_row("A", ValueType::U16))?;
    t.add_row(&[("A", Value::U16(0x1234))])?;
    assert_eq!(t.to_bytes()?, MINIMAL.to_vec());
    Ok(())
}

#[test]
fn test_parse_minimal() -> Result<()> {
    let t = Table::parse(&MINIMAL)?;
    assert_eq!(t.name(), "T");
    assert_eq!(t.encoding(), TextEncoding::Utf8);
    assert_eq!(t.row_count(), 1);
    assert_eq!(t.get(0, "A")?, Some(&Value::U16(0x1234)));
    assert_eq!(t.to_bytes()?, MINIMAL.to_vec());
    Ok(())
}

#[test]
fn test_invalid_magic() {
    let mut bytes = MINIMAL;
    bytes[0] = b'#';
    assert!(matches!(Table::parse(&bytes), Err(Error::InvalidMagic { .. })));
}

#[test]
fn test_truncated() {
    assert!(matches!(Table::parse(&MINIMAL[..20]), Err(Error::UnexpectedEof(_))));
}

#[test]
fn test_row_offset_mismatch() {
    let mut bytes = MINIMAL;
    bytes[11] = 30;
    assert!(matches!(
        Table::parse(&bytes),
        Err(Error::OffsetMismatch { what: "row block", .. })
    ));
}

#[test]
fn test_row_width_mismatch() {
    let mut bytes = MINIMAL;
    bytes[27] = 3;
    assert!(matches!(
        Table::parse(&bytes),
        Err(Error::OffsetMismatch { what: "row width", .. })
    ));
}

#[test]
fn test_nonzero_padding() {
    let mut bytes = MINIMAL;
    bytes[39] = 1;
    assert!(matches!(Table::parse(&bytes), Err(Error::NonZeroPadding(39))));

    let mut bytes = MINIMAL;
    bytes[47] = 1;
    assert!(matches!(Table::parse(&bytes), Err(Error::NonZeroPadding(47))));
}

#[test]
fn test_reserved_byte() {
    let mut bytes = MINIMAL;
    bytes[8] = 1;
    assert!(Table::parse(&bytes).unwrap_err().is_format());
}

#[test]
fn test_default_and_row_flags_conflict() {
    let mut bytes = MINIMAL;
    bytes[32] = 0x72;
    assert!(matches!(Table::parse(&bytes), Err(Error::Format(_))));
}

#[test]
fn test_mixed_roundtrip() -> Result<()> {
    let t = mixed_table();
    let bytes = t.to_bytes()?;
    assert_eq!(bytes.len() % 4, 0);
    let parsed = Table::parse(&bytes)?;
    assert_eq!(parsed, t);
    assert_eq!(parsed.to_bytes()?, bytes);
    assert_eq!(parsed.get(2, "Gain")?, Some(&Value::F32(1.0)));
    assert_eq!(parsed.get(1, "Label")?, Some(&Value::string("shared")));
    assert_eq!(parsed.get(0, "Missing")?, None);
    assert!(parsed.blob(0, "Data")?.is_some_and(Blob::is_empty));
    Ok(())
}

#[test]
fn test_promotion_survives_roundtrip() -> Result<()> {
    let mut t = mixed_table();
    t.set(1, "Label", Value::string("own"))?;
    let parsed = Table::parse(&t.to_bytes()?)?;
    assert!(parsed.fields()[5].is_per_row());
    assert_eq!(parsed.get(0, "Label")?, Some(&Value::string("shared")));
    assert_eq!(parsed.get(1, "Label")?, Some(&Value::string("own")));
    Ok(())
}

#[test]
fn test_nested_table_with_slack() -> Result<()> {
    let mut inner = Table::new("Inner");
    inner.add_field(Field::per_row("X", ValueType::U8))?;
    inner.add_row(&[("X", Value::U8(1))])?;

    // Nested table followed by 4 zero bytes inside the blob.
    let mut raw = inner.to_bytes()?;
    raw.extend_from_slice(&[0; 4]);

    let mut outer = Table::new("Outer");
    outer.add_field(Field::per_row("Child", ValueType::Blob))?;
    outer.add_row(&[("Child", Value::bytes(raw))])?;
    let bytes = outer.to_bytes()?;

    let parsed = Table::parse(&bytes)?;
    let blob = parsed.blob(0, "Child")?.expect("child blob");
    assert_eq!(blob.slack(), 4);
    assert_eq!(blob.tag(), Some(*UTF_MAGIC));
    assert_eq!(parsed.table(0, "Child")?, Some(&inner));
    assert_eq!(parsed.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn test_nested_mutation() -> Result<()> {
    let mut inner = Table::new("Inner");
    inner.add_field(Field::per_row("X", ValueType::U8))?;
    inner.add_row(&[("X", Value::U8(1))])?;
    let mut outer = Table::new("Outer");
    outer.add_field(Field::per_row("Child", ValueType::Blob))?;
    outer.add_row(&[("Child", Value::Blob(Blob::from_table(inner)))])?;

    let child = outer.table_mut(0, "Child")?.expect("nested table");
    child.add_row(&[("X", Value::U8(2))])?;

    let parsed = Table::parse(&outer.to_bytes()?)?;
    let child = parsed.table(0, "Child")?.expect("nested table");
    assert_eq!(child.row_count(), 2);
    assert_eq!(child.get(1, "X")?, Some(&Value::U8(2)));
    Ok(())
}

#[test]
fn test_blob_alignment_preserved() -> Result<()> {
    let mut t = Table::new("Aligned");
    t.add_field(Field::per_row("Data", ValueType::Blob))?;
    t.add_row(&[("Data", Value::bytes(vec![1; 5]))])?;
    t.add_row(&[("Data", Value::bytes(vec![2; 5]))])?;
    t.set_layout(HeapLayout { blob_align: 32, ..HeapLayout::default() });
    let bytes = t.to_bytes()?;

    let parsed = Table::parse(&bytes)?;
    assert_eq!(parsed.layout().blob_align, 32);
    assert_eq!(parsed.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn test_pooled_strings() -> Result<()> {
    let mut t = Table::new("Pool");
    t.add_field(Field::per_row("Name", ValueType::String))?;
    for _ in 0..4 {
        t.add_row(&[("Name", Value::string("same"))])?;
    }
    let plain = t.to_bytes()?;
    t.set_layout(HeapLayout { pooled_strings: true, ..HeapLayout::default() });
    let pooled = t.to_bytes()?;
    assert!(pooled.len() < plain.len());

    let parsed = Table::parse(&pooled)?;
    assert!(parsed.layout().pooled_strings);
    assert_eq!(parsed.to_bytes()?, pooled);
    assert!(!Table::parse(&plain)?.layout().pooled_strings);
    Ok(())
}

#[test]
fn test_string_with_nul_rejected() -> Result<()> {
    let mut t = Table::new("Bad");
    t.add_field(Field::per_row("Name", ValueType::String))?;
    t.add_row(&[("Name", Value::String(HeapString::from_bytes(vec![b'a', 0, b'b'])))])?;
    assert!(matches!(t.to_bytes(), Err(Error::Layout(_))));
    Ok(())
}

#[test]
fn test_shift_jis_bytes_preserved() -> Result<()> {
    let mut t = Table::with_encoding(HeapString::from("Legacy"), TextEncoding::ShiftJis);
    t.add_field(Field::per_row("Name", ValueType::String))?;
    t.add_row(&[("Name", Value::String(HeapString::from_bytes(vec![0x83, 0x65, 0x83, 0x58])))])?;
    let parsed = Table::parse(&t.to_bytes()?)?;
    assert_eq!(parsed.encoding(), TextEncoding::ShiftJis);
    assert_eq!(
        parsed.string(0, "Name")?.map(HeapString::as_bytes),
        Some(&[0x83, 0x65, 0x83, 0x58][..])
    );
    Ok(())
}

#[test]
fn test_empty_table() -> Result<()> {
    let mut t = Table::new("Empty");
    t.add_field(Field::per_row("Id", ValueType::U16))?;
    let parsed = Table::parse(&t.to_bytes()?)?;
    assert_eq!(parsed.row_count(), 0);
    assert_eq!(parsed, t);
    Ok(())
}

/// AFS2 header, 8-byte positions, two entries, the second near `u64::MAX`.
fn overflowing_archive_header() -> Vec<u8> {
    let mut out = b"AFS2".to_vec();
    out.extend_from_slice(&[2, 8, 2, 0]);
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&32u16.to_le_bytes());
    out.extend_from_slice(&[0, 0, 0, 0, 1, 0]);
    for p in [44, u64::MAX - 1, u64::MAX] {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out
}

#[test]
fn test_malformed_nested_archive() -> Result<()> {
    let mut t = Table::new("Outer");
    t.add_field(Field::per_row("Awb", ValueType::Blob))?;
    t.add_row(&[("Awb", Value::bytes(overflowing_archive_header()))])?;
    let bytes = t.to_bytes()?;

    let err = Table::parse(&bytes).unwrap_err();
    assert!(err.is_format(), "{}", err);

    // Positions going backwards inside the nested header.
    let mut header = overflowing_archive_header();
    header[28..36].copy_from_slice(&40u64.to_le_bytes());
    let mut t = Table::new("Outer");
    t.add_field(Field::per_row("Awb", ValueType::Blob))?;
    t.add_row(&[("Awb", Value::bytes(header))])?;
    let err = Table::parse(&t.to_bytes()?).unwrap_err();
    assert!(matches!(err, Error::OffsetMismatch { .. }), "{}", err);
    Ok(())
}
