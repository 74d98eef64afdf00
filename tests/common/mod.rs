//! Shared fixtures: small synthetic cue sheets and ADX payloads.

#![allow(dead_code)]

use acb::acb::{CueSheet, TableKind};
use acb::afs2::Archive;
use acb::codec::EncodeType;

/// Mono 24 kHz ADX header declaring 32 samples, no loop.
pub const ADX_MONO: [u8; 17] = [0x80, 0x00, 0x00, 0x1C, 3, 18, 4, 1, 0, 0, 0x5D, 0xC0, 0, 0, 0, 0x20, 0xAA];

/// Stereo 44.1 kHz ADX with loop points 100..5000.
pub fn adx_looped() -> Vec<u8> {
    let mut d = vec![
        0x80, 0x00, 0x00, 0x3C, 3, 18, 4, 2, 0x00, 0x00, 0xAC, 0x44, 0x00, 0x01, 0x00, 0x00, 0x01, 0xF4, 4, 0,
    ];
    d.extend([0u8; 12]);
    d.extend([0, 0, 0, 1]);
    d.extend(0u32.to_be_bytes());
    d.extend(100u32.to_be_bytes());
    d.extend(0u32.to_be_bytes());
    d.extend(5000u32.to_be_bytes());
    d.extend(0u32.to_be_bytes());
    d.resize(0x3C + 4, 0);
    d
}

/// Sequence command stream stored in row 0 of a fixture.
pub const SEQ_COMMANDS: [u8; 7] = [0x00, 0x41, 0x04, 0x00, 0x00, 0x00, 0x02];

/// Sheet with every table, one memory cue (explicit id 0, "first") and a
/// sequence command row 0.
pub fn sheet() -> CueSheet {
    let mut sheet = CueSheet::create("Fixture").unwrap();
    sheet
        .add_waveform_and_cue(false, ADX_MONO.to_vec(), EncodeType::ADX, Some("first"), Some(0), Some(SEQ_COMMANDS.to_vec()))
        .unwrap();
    assert_eq!(sheet.table(TableKind::SeqCommand).unwrap().row_count(), 1);
    sheet
}

/// [`sheet`] plus a companion archive holding one streamed cue (id 1).
pub fn streamed_sheet() -> CueSheet {
    let mut sheet = sheet();
    sheet.attach_stream_archive(Archive::new(0)).unwrap();
    let (id, _) = sheet
        .add_waveform_and_cue(true, ADX_MONO.to_vec(), EncodeType::ADX, Some("streamed"), None, None)
        .unwrap();
    assert_eq!(id, 1);
    sheet
}

/// Serialize and load again, checking the stored hash.
pub fn reload(sheet: &CueSheet) -> CueSheet {
    let acb = sheet.to_bytes().unwrap();
    let awb = sheet.stream_to_bytes().unwrap();
    CueSheet::load(&acb, awb.as_deref(), &Default::default()).unwrap()
}
