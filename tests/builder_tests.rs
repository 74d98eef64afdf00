//! Cue sheet construction and payload replacement.

mod common;

use acb::acb::{
    content_hash, decode_commands, CommandArgs, CueSheet, HashStatus, LoadOptions, Reference, ReferenceKind, TableKind,
};
use acb::codec::EncodeType;
use acb::utf::Table;
use acb::Error;

use common::{adx_looped, reload, sheet, streamed_sheet, ADX_MONO, SEQ_COMMANDS};

fn rows(table: &Table) -> Vec<Vec<Option<acb::Value>>> {
    (0..table.row_count())
        .map(|r| (0..table.fields().len()).map(|f| table.get_at(r, f).cloned()).collect())
        .collect()
}

#[test]
fn test_add_waveform_and_cue_scenario() {
    let mut sheet = sheet();
    let (cue_id, name_row) = sheet
        .add_waveform_and_cue(false, ADX_MONO.to_vec(), EncodeType::ADX, None, None, None)
        .unwrap();
    assert_eq!(cue_id, 1);
    assert_eq!(name_row, 1);
    assert_eq!(sheet.cue_name(1).unwrap().as_deref(), Some("Cue1"));

    let waveform_row = *sheet.waveform_rows(false, 1).unwrap().iter().next().unwrap();
    let waveforms = sheet.table(TableKind::Waveform).unwrap();
    assert_eq!(waveforms.uint(waveform_row, "SamplingRate").unwrap(), Some(24000));
    assert_eq!(waveforms.uint(waveform_row, "NumSamples").unwrap(), Some(32));
    assert_eq!(waveforms.uint(waveform_row, "LoopFlag").unwrap(), Some(1));

    let synths = sheet.table(TableKind::Synth).unwrap();
    let synth_row = synths.row_count() - 1;
    let items = synths.blob(synth_row, "ReferenceItems").unwrap().unwrap().bytes().unwrap();
    assert_eq!(Reference::decode_items(items).unwrap(), vec![Reference::new(ReferenceKind::Waveform, waveform_row as u16)]);

    let tracks = sheet.table(TableKind::Track).unwrap();
    let event_row = tracks.uint(tracks.row_count() - 1, "EventIndex").unwrap().unwrap() as usize;
    let events = sheet.table(TableKind::TrackEvent).unwrap();
    let stream = events.blob(event_row, "Command").unwrap().unwrap().bytes().unwrap();
    let commands = decode_commands(stream).unwrap();
    let notes: Vec<_> = commands.iter().filter_map(|c| c.note_target()).collect();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].as_ref().unwrap(), &Reference::new(ReferenceKind::Synth, synth_row as u16));
    assert!(matches!(commands.last().unwrap().args(), CommandArgs::Null));

    // Sequence commands default to a copy of row 0.
    let seq = sheet.table(TableKind::SeqCommand).unwrap();
    assert_eq!(seq.blob(1, "Command").unwrap().unwrap().bytes(), Some(&SEQ_COMMANDS[..]));
}

#[test]
fn test_first_cue_on_empty_container() {
    let mut sheet = CueSheet::create("Empty").unwrap();
    let (cue_id, name_row) = sheet
        .add_waveform_and_cue(false, ADX_MONO.to_vec(), EncodeType::ADX, None, None, None)
        .unwrap();
    assert_eq!((cue_id, name_row), (1, 0));
    assert_eq!(sheet.cue_name(1).unwrap().as_deref(), Some("Cue1"));
    assert_eq!(sheet.memory_archive().unwrap().payload(0), Some(&ADX_MONO[..]));

    let loaded = reload(&sheet);
    assert_eq!(loaded.cue_ids().collect::<Vec<_>>(), vec![1]);
    assert_eq!(loaded.next_cue_id(), 2);
}

#[test]
fn test_scenario_survives_serialization() {
    let mut sheet = sheet();
    sheet
        .add_waveform_and_cue(false, ADX_MONO.to_vec(), EncodeType::ADX, Some("second"), Some(10), None)
        .unwrap();
    let loaded = reload(&sheet);
    assert_eq!(loaded.cue_ids().collect::<Vec<_>>(), vec![0, 10]);
    assert_eq!(loaded.cue_name(10).unwrap().as_deref(), Some("second"));
    assert_eq!(loaded.memory_archive().unwrap().payload(1), Some(&ADX_MONO[..]));
    assert_eq!(loaded.to_bytes().unwrap(), sheet.to_bytes().unwrap());
}

#[test]
fn test_add_rows_leave_existing_rows() {
    let mut sheet = sheet();
    for kind in [TableKind::Waveform, TableKind::Synth, TableKind::Track, TableKind::Sequence, TableKind::Cue] {
        let before = rows(sheet.table(kind).unwrap());
        let count = before.len();
        let row = match kind {
            TableKind::Waveform => sheet.add_waveform_row(false, EncodeType::ADX, 0).unwrap().1,
            TableKind::Synth => sheet.add_synth_row(0).unwrap(),
            TableKind::Track => sheet.add_track_row(0).unwrap(),
            TableKind::Sequence => sheet.add_sequence_row(&[0, 0], None).unwrap(),
            _ => sheet.add_cue_row(5, 0, None).unwrap().1,
        };
        assert_eq!(row, count, "{:?}", kind);
        let after = rows(sheet.table(kind).unwrap());
        assert_eq!(after.len(), count + 1);
        assert_eq!(&after[..count], &before[..]);
    }
}

#[test]
fn test_duplicate_cue_is_rejected_without_changes() {
    let mut sheet = sheet();
    let before = sheet.to_bytes().unwrap();
    let err = sheet.add_waveform_and_cue(false, ADX_MONO.to_vec(), EncodeType::ADX, None, Some(0), None);
    assert!(matches!(err, Err(Error::DuplicateCueId(0))));
    assert_eq!(sheet.to_bytes().unwrap(), before);
    assert_eq!(sheet.memory_archive().unwrap().len(), 1);
}

#[test]
fn test_unknown_encoding_is_rejected_without_changes() {
    let mut sheet = sheet();
    let before = sheet.to_bytes().unwrap();
    let err = sheet.add_waveform_and_cue(false, vec![0; 64], EncodeType::OGG, None, None, None);
    assert!(matches!(err, Err(Error::UnsupportedEncoding(_))));
    assert_eq!(sheet.to_bytes().unwrap(), before);
}

#[test]
fn test_loop_points_create_extension_row() {
    let mut sheet = sheet();
    let (cue_id, _) = sheet
        .add_waveform_and_cue(false, adx_looped(), EncodeType::ADX, None, None, None)
        .unwrap();
    let row = *sheet.waveform_rows(false, 1).unwrap().iter().next().unwrap();
    let waveforms = sheet.table(TableKind::Waveform).unwrap();
    assert_eq!(waveforms.uint(row, "LoopFlag").unwrap(), Some(2));
    assert_eq!(waveforms.uint(row, "NumChannels").unwrap(), Some(2));
    let ext = waveforms.uint(row, "ExtensionData").unwrap().unwrap() as usize;
    let extension = sheet.table(TableKind::WaveformExtensionData).unwrap();
    assert_eq!(extension.uint(ext, "LoopStart").unwrap(), Some(100));
    assert_eq!(extension.uint(ext, "LoopEnd").unwrap(), Some(5000));

    let cue_row = sheet.cue_row(cue_id).unwrap();
    let cues = sheet.table(TableKind::Cue).unwrap();
    assert_eq!(cues.uint(cue_row, "Length").unwrap(), Some(65536 * 1000 / 44100));
}

#[test]
fn test_replace_memory_waveform() {
    let mut sheet = sheet();
    sheet.replace_waveform(0, false, adx_looped(), EncodeType::ADX).unwrap();
    assert_eq!(sheet.memory_archive().unwrap().payload(0), Some(&adx_looped()[..]));
    let waveforms = sheet.table(TableKind::Waveform).unwrap();
    assert_eq!(waveforms.uint(0, "SamplingRate").unwrap(), Some(44100));
    assert_eq!(waveforms.uint(0, "LoopFlag").unwrap(), Some(2));
    let ext = waveforms.uint(0, "ExtensionData").unwrap().unwrap();

    // Same loop row is updated in place; dropping the loop clears the index
    // and leaves the row behind.
    sheet.replace_waveform(0, false, adx_looped(), EncodeType::ADX).unwrap();
    assert_eq!(sheet.table(TableKind::Waveform).unwrap().uint(0, "ExtensionData").unwrap(), Some(ext));
    sheet.replace_waveform(0, false, ADX_MONO.to_vec(), EncodeType::ADX).unwrap();
    let waveforms = sheet.table(TableKind::Waveform).unwrap();
    assert_eq!(waveforms.uint(0, "LoopFlag").unwrap(), Some(1));
    assert_eq!(waveforms.uint(0, "ExtensionData").unwrap(), Some(0xFFFF));
    assert_eq!(sheet.table(TableKind::WaveformExtensionData).unwrap().row_count(), 1);
}

#[test]
fn test_replace_unknown_archive_id() {
    let mut sheet = sheet();
    let err = sheet.replace_waveform(42, false, ADX_MONO.to_vec(), EncodeType::ADX);
    assert!(matches!(err, Err(Error::UnknownArchiveId(42))));
    let err = sheet.replace_waveform(0, true, ADX_MONO.to_vec(), EncodeType::ADX);
    assert!(matches!(err, Err(Error::UnknownArchiveId(0))));
}

#[test]
fn test_stream_hash_after_replace() {
    let mut sheet = streamed_sheet();
    assert_eq!(sheet.hash_status(), HashStatus::Match);

    sheet.replace_waveform(0, true, adx_looped(), EncodeType::ADX).unwrap();
    let stream = sheet.stream_archive().unwrap();
    assert!(sheet.stream_header_summary().unwrap().header_equals(stream));
    assert_eq!(sheet.check_stream_header(), Some(true));

    let awb = sheet.stream_to_bytes().unwrap().unwrap();
    assert_eq!(sheet.stored_stream_hash().unwrap(), Some(content_hash(&awb)));

    let loaded = reload(&sheet);
    assert_eq!(loaded.hash_status(), HashStatus::Match);
    assert_eq!(loaded.stream_archive().unwrap().payload(0), Some(&adx_looped()[..]));
}

#[test]
fn test_stale_hash_is_reported() {
    let sheet = streamed_sheet();
    let acb = sheet.to_bytes().unwrap();
    let mut awb = sheet.stream_to_bytes().unwrap().unwrap();
    let last = awb.len() - 1;
    awb[last] ^= 0x55;

    let loaded = CueSheet::load(&acb, Some(&awb[..]), &LoadOptions::default()).unwrap();
    assert!(matches!(loaded.hash_status(), HashStatus::Mismatch { .. }));
    let unchecked = CueSheet::load(&acb, Some(&awb[..]), &LoadOptions { verify_hash: false }).unwrap();
    assert_eq!(unchecked.hash_status(), HashStatus::NotChecked);
}

#[test]
fn test_save_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let acb = dir.path().join("fixture.acb");
    let awb = dir.path().join("fixture.awb");
    let sheet = streamed_sheet();
    sheet.save(&acb, Some(awb.as_path())).unwrap();

    let opened = CueSheet::open(&acb, Some(awb.as_path()), &LoadOptions::default()).unwrap();
    assert_eq!(opened.hash_status(), HashStatus::Match);
    assert_eq!(opened.cue_ids().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(opened.cue_name(1).unwrap().as_deref(), Some("streamed"));

    let missing = dir.path().join("missing.acb");
    assert!(matches!(
        CueSheet::open(&missing, None, &LoadOptions::default()),
        Err(Error::FileNotFound(_))
    ));
}
