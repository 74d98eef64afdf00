//! AFS2 archive round trips and id assignment.

use std::fs;

use acb::afs2::Archive;
use acb::Error;

fn archive_with(entries: &[(Option<u64>, &[u8])]) -> Archive {
    let mut archive = Archive::new(0);
    for (id, data) in entries {
        archive.append(*id, data.to_vec()).unwrap();
    }
    archive
}

#[test]
fn test_auto_id_above_maximum() {
    let mut archive = archive_with(&[(Some(5), b"five"), (Some(7), b"seven")]);
    assert_eq!(archive.append(None, b"eight".to_vec()).unwrap(), 8);
    assert_eq!(archive.ids().collect::<Vec<_>>(), vec![5, 7, 8]);
    assert!(matches!(archive.append(Some(7), vec![1]), Err(Error::DuplicateId(7))));
}

#[test]
fn test_serialize_parse_serialize() {
    let archive = archive_with(&[(None, &[1; 3]), (None, &[]), (None, &[2; 40]), (Some(100), &[3; 33])]);
    let bytes = archive.to_bytes().unwrap();
    let parsed = Archive::parse(&bytes).unwrap();
    assert_eq!(parsed, archive);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
    assert_eq!(parsed.payload(2), Some(&[2u8; 40][..]));
    assert_eq!(parsed.payload(1), Some(&[][..]));
}

#[test]
fn test_entries_are_aligned() {
    let archive = archive_with(&[(None, &[9; 5]), (None, &[8; 5])]);
    let bytes = archive.to_bytes().unwrap();
    for entry in archive.entries() {
        assert_eq!(entry.offset() % 32, 0);
    }
    let second = archive.entry(1).unwrap();
    assert_eq!(&bytes[second.offset() as usize..second.offset() as usize + 5], &[8; 5]);
}

#[test]
fn test_replace_moves_later_entries() {
    let mut archive = archive_with(&[(None, &[1; 10]), (None, &[2; 10])]);
    let before = archive.entry(1).unwrap().offset();
    archive.replace_payload(0, vec![7; 70]).unwrap();
    assert!(archive.entry(1).unwrap().offset() > before);

    let parsed = Archive::parse(&archive.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.payload(0), Some(&[7u8; 70][..]));
    assert_eq!(parsed.payload(1), Some(&[2u8; 10][..]));
}

#[test]
fn test_header_only_summary() {
    let archive = archive_with(&[(None, &[1; 10]), (None, &[2; 50])]);
    let bytes = archive.to_bytes().unwrap();

    let header = Archive::parse_header(&bytes).unwrap();
    assert!(header.is_header_only());
    assert!(header.header_equals(&archive));
    assert_eq!(header.payload(0), None);

    let mut summary = Archive::new(0);
    summary.sync_header_from(&archive);
    let summary_bytes = summary.to_bytes().unwrap();
    assert!(summary_bytes.len() < bytes.len());
    assert!(Archive::parse(&summary_bytes).unwrap().header_equals(&archive));
}

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.awb");
    let archive = archive_with(&[(None, b"first"), (None, b"second")]);
    fs::write(&path, archive.to_bytes().unwrap()).unwrap();

    let data = acb::util::FileBytes::open(&path).unwrap();
    let parsed = Archive::parse(&data).unwrap();
    assert_eq!(parsed.payload(1), Some(&b"second"[..]));
}

/// Raw header with 2-byte ids `0..n` and the given positions and end.
fn raw_header(position_width: u8, positions: &[u64], end: u64) -> Vec<u8> {
    let mut out = b"AFS2".to_vec();
    out.extend_from_slice(&[2, position_width, 2, 0]);
    out.extend_from_slice(&(positions.len() as u32).to_le_bytes());
    out.extend_from_slice(&32u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    for id in 0..positions.len() as u16 {
        out.extend_from_slice(&id.to_le_bytes());
    }
    for &p in positions.iter().chain(Some(&end)) {
        out.extend_from_slice(&p.to_le_bytes()[..position_width as usize]);
    }
    out
}

fn assert_format_error(bytes: &[u8]) {
    for result in [Archive::parse_header(bytes), Archive::parse(bytes)] {
        match result {
            Err(e) => assert!(e.is_format(), "{}", e),
            Ok(a) => panic!("parsed malformed header: {:?}", a),
        }
    }
}

#[test]
fn test_position_near_u64_max() {
    // 16 + 2 * 2 + 3 * 8 = 44
    assert_format_error(&raw_header(8, &[44, u64::MAX - 1], u64::MAX));
}

#[test]
fn test_decreasing_positions() {
    assert_format_error(&raw_header(4, &[38, 100, 64], 200));
}

#[test]
fn test_end_before_last_entry() {
    assert_format_error(&raw_header(4, &[32, 96], 64));
    assert_format_error(&raw_header(4, &[], 0));
}

#[test]
fn test_entry_padding_past_end() {
    // Second entry starts at 40, aligns to 64, but the archive ends at 50.
    assert_format_error(&raw_header(4, &[32, 40], 50));
}

#[test]
fn test_entry_count_beyond_data() {
    let mut bytes = raw_header(4, &[], 20);
    bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    assert_format_error(&bytes);
}
