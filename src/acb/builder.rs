//! Appending archive entries and graph rows.
//!
//! Every `add_*_row` appends one row to its table and returns the new row
//! index. The composite operations ([`CueSheet::add_waveform_and_cue`],
//! [`CueSheet::replace_waveform`]) either complete or leave the sheet as
//! it was.

use tracing::{debug, info};

use crate::afs2::Archive;
use crate::codec::{AudioInfo, EncodeType};
use crate::utf::{Blob, Field, HeapString, Table, TextEncoding, Value};
use crate::util::{Error, Result, ValueType};

use super::{
    decode_commands, encode_commands, field_u64, opt_u64, Command, CommandLayout, CueSheet,
    IdScheme, Reference, ReferenceKind, TableKind, MEMORY_ARCHIVE_FIELD, NO_ID, NO_INDEX,
    STREAM_HASH_FIELD, STREAM_HEADER_FIELD,
};

/// Default `Version` of sheets made by [`CueSheet::create`].
pub const DEFAULT_VERSION: u32 = 0x0130_0000;

fn index_u16(what: &str, row: usize) -> Result<u16> {
    u16::try_from(row)
        .ok()
        .filter(|&i| i != NO_INDEX)
        .ok_or_else(|| Error::Layout(format!("{} row {} does not fit a 16-bit index", what, row)))
}

fn empty_blob() -> Value {
    Value::Blob(Blob::empty())
}

// ============================================================================
// Empty sheets
// ============================================================================

fn schema(name: &str, fields: &[(&str, ValueType)]) -> Result<Table> {
    let mut table = Table::new(name);
    for (field, ty) in fields {
        table.add_field(Field::per_row(field, *ty))?;
    }
    Ok(table)
}

fn empty_tables() -> Result<Vec<(TableKind, Table)>> {
    use ValueType::{Blob as Data, String as Text, U16, U32, U8};
    Ok(vec![
        (TableKind::Cue, schema("Cue", &[
            ("CueId", U32),
            ("ReferenceType", U8),
            ("ReferenceIndex", U16),
            ("UserData", Text),
            ("Worksize", U16),
            ("AisacControlMap", Data),
            ("Length", U32),
            ("NumAisacControlMaps", U8),
            ("HeaderVisibility", U8),
        ])?),
        (TableKind::CueName, schema("CueName", &[("CueName", Text), ("CueIndex", U16)])?),
        (TableKind::Waveform, schema("Waveform", &[
            ("EncodeType", U8),
            ("Streaming", U8),
            ("NumChannels", U8),
            ("LoopFlag", U8),
            ("SamplingRate", U16),
            ("NumSamples", U32),
            ("ExtensionData", U16),
            ("MemoryAwbId", U16),
            ("StreamAwbPortNo", U16),
            ("StreamAwbId", U16),
        ])?),
        (TableKind::Synth, schema("Synth", &[
            ("Type", U8),
            ("VoiceLimitGroupName", Text),
            ("CommandIndex", U16),
            ("ReferenceItems", Data),
            ("LocalAisacs", Data),
            ("GlobalAisacStartIndex", U16),
            ("GlobalAisacNumRefs", U16),
            ("ControlWorkArea1", U16),
            ("ControlWorkArea2", U16),
            ("TrackValues", Data),
            ("ParameterPallet", U16),
            ("ActionTrackStartIndex", U16),
            ("NumActionTracks", U16),
        ])?),
        (TableKind::Track, schema("Track", &[
            ("EventIndex", U16),
            ("CommandIndex", U16),
            ("LocalAisacs", Data),
            ("GlobalAisacStartIndex", U16),
            ("GlobalAisacNumRefs", U16),
            ("ParameterPallet", U16),
            ("TargetType", U8),
            ("TargetName", Text),
            ("TargetId", U32),
            ("TargetAcbName", Text),
            ("Scope", U8),
            ("TargetTrackNo", U16),
        ])?),
        (TableKind::Sequence, schema("Sequence", &[
            ("PlaybackRatio", U16),
            ("NumTracks", U16),
            ("TrackIndex", Data),
            ("CommandIndex", U16),
            ("LocalAisacs", Data),
            ("GlobalAisacStartIndex", U16),
            ("GlobalAisacNumRefs", U16),
            ("ParameterPallet", U16),
            ("ActionTrackStartIndex", U16),
            ("NumActionTracks", U16),
            ("TrackValues", Data),
            ("Type", U8),
            ("ControlWorkArea1", U16),
            ("ControlWorkArea2", U16),
        ])?),
        (TableKind::TrackEvent, schema("TrackEvent", &[("Command", Data)])?),
        (TableKind::TrackCommand, schema("TrackCommand", &[("Command", Data)])?),
        (TableKind::SynthCommand, schema("SynthCommand", &[("Command", Data)])?),
        (TableKind::SeqCommand, schema("SeqCommand", &[("Command", Data)])?),
        (TableKind::StringValue, schema("StringValue", &[("StringValue", Text)])?),
        (TableKind::GlobalAisacReference, schema("GlobalAisacReference", &[("Name", Text)])?),
        (TableKind::OutsideLink, schema("OutsideLink", &[("Id", U16), ("AcbNameStringIndex", U16)])?),
        (TableKind::WaveformExtensionData, extension_table(TextEncoding::Utf8)?),
        (TableKind::AcfReference, schema("AcfReference", &[("Type", U8), ("Name", Text), ("Id", U32)])?),
    ])
}

fn extension_table(encoding: TextEncoding) -> Result<Table> {
    let mut table = Table::with_encoding(HeapString::from("WaveformExtensionData"), encoding);
    table.add_field(Field::per_row("LoopStart", ValueType::U32))?;
    table.add_field(Field::per_row("LoopEnd", ValueType::U32))?;
    Ok(table)
}

impl CueSheet {
    /// A sheet with every table and no rows, an empty memory archive and no
    /// companion archive.
    pub fn create(name: &str) -> Result<Self> {
        let mut header = Table::new("Header");
        header.add_field(Field::per_row("Name", ValueType::String))?;
        header.add_field(Field::per_row("Version", ValueType::U32))?;
        let tables = empty_tables()?;
        for (kind, _) in &tables {
            header.add_field(Field::per_row(kind.field(CommandLayout::Separate), ValueType::Blob))?;
        }
        for field in [MEMORY_ARCHIVE_FIELD, STREAM_HASH_FIELD, STREAM_HEADER_FIELD] {
            header.add_field(Field::per_row(field, ValueType::Blob))?;
        }

        let mut row = vec![
            ("Name", Value::string(name)),
            ("Version", Value::U32(DEFAULT_VERSION)),
            (MEMORY_ARCHIVE_FIELD, Value::Blob(Blob::from_archive(Archive::new(0)))),
        ];
        for (kind, table) in tables {
            row.push((kind.field(CommandLayout::Separate), Value::Blob(Blob::from_table(table))));
        }
        header.add_row(&row)?;
        Self::new(header, None)
    }

    /// Attach a companion archive, writing its header summary and hash.
    pub fn attach_stream_archive(&mut self, archive: Archive) -> Result<()> {
        self.atomically(|s| {
            if s.stream_header_summary().is_none() && s.header().has_field(STREAM_HEADER_FIELD) {
                s.header_mut().set(0, STREAM_HEADER_FIELD, Value::Blob(Blob::from_archive(Archive::new(0))))?;
            }
            s.set_stream_archive(archive);
            s.sync_stream_header()?;
            s.refresh_hash()
        })
    }

    // ------------------------------------------------------------------------
    // Archive entries
    // ------------------------------------------------------------------------

    fn archive_mut(&mut self, streaming: bool) -> Result<&mut Archive> {
        if streaming {
            return self
                .stream_archive_mut()
                .ok_or_else(|| Error::MissingTable("stream archive".into()));
        }
        self.header_mut()
            .archive_mut(0, MEMORY_ARCHIVE_FIELD)?
            .ok_or_else(|| Error::MissingTable("memory archive".into()))
    }

    /// Append a payload to the memory or stream archive and return its id.
    ///
    /// Without an id the next id past the current maximum is used. Adding
    /// to the stream archive also refreshes the header summary and hash.
    /// An empty memory archive cell gets a new archive.
    pub fn add_awb_entry(&mut self, streaming: bool, payload: Vec<u8>, id: Option<u64>) -> Result<u64> {
        if streaming {
            return self.atomically(|s| {
                let id = s.archive_mut(true)?.append(id, payload)?;
                s.sync_stream_header()?;
                s.refresh_hash()?;
                Ok(id)
            });
        }
        let blob = self.header_mut().blob_mut(0, MEMORY_ARCHIVE_FIELD)?;
        if blob.is_empty() {
            let mut archive = Archive::new(0);
            let id = archive.append(id, payload)?;
            *blob = Blob::from_archive(archive);
            debug!(id, "created memory archive");
            return Ok(id);
        }
        blob.archive_mut()
            .ok_or_else(|| Error::format("memory archive cell does not hold an AFS2 archive"))?
            .append(id, payload)
    }

    // ------------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------------

    /// Add a waveform row for archive entry `awb_id`, probing the payload for
    /// its metadata. Loop points, when present, get an extension data row.
    pub fn add_waveform_row(
        &mut self,
        streaming: bool,
        encode_type: EncodeType,
        awb_id: u64,
    ) -> Result<(AudioInfo, usize)> {
        let payload = self
            .archive(streaming)
            .and_then(|a| a.payload(awb_id))
            .ok_or(Error::UnknownArchiveId(awb_id))?;
        let info = self.codecs().probe(encode_type, payload)?;

        self.atomically(|s| {
            let ext = match info.loop_points {
                Some(lp) => Some(s.add_waveform_extension_row(lp.start, lp.end)?),
                None => None,
            };
            let mut values = vec![
                ("EncodeType", Value::U8(encode_type.0)),
                ("Streaming", Value::U8(streaming as u8)),
                ("NumChannels", Value::U32(info.channel_count)),
                ("LoopFlag", Value::U8(if ext.is_some() { 2 } else { 1 })),
                ("SamplingRate", Value::U32(info.sample_rate)),
                ("NumSamples", Value::U32(info.sample_count)),
                ("ExtensionData", Value::U64(ext.map_or(NO_INDEX as u64, |e| e as u64))),
                ("StreamAwbPortNo", Value::U16(0)),
            ];
            match s.id_scheme() {
                IdScheme::Simple => values.push(("Id", Value::U64(awb_id))),
                IdScheme::Split => {
                    let (memory, stream) = if streaming {
                        (NO_INDEX as u64, awb_id)
                    } else {
                        (awb_id, NO_INDEX as u64)
                    };
                    values.push(("MemoryAwbId", Value::U64(memory)));
                    values.push(("StreamAwbId", Value::U64(stream)));
                }
            }
            let row = s.table_mut(TableKind::Waveform)?.add_row(&values)?;
            s.index_waveform(streaming, awb_id, row);
            debug!(row, awb_id, streaming, "added waveform row");
            Ok((info, row))
        })
    }

    fn ensure_extension_table(&mut self) -> Result<()> {
        if self.table_opt(TableKind::WaveformExtensionData).is_some() {
            return Ok(());
        }
        let table = extension_table(self.header().encoding())?;
        let field = TableKind::WaveformExtensionData.field(self.command_layout());
        let header = self.header_mut();
        if !header.has_field(field) {
            header.add_field(Field::per_row(field, ValueType::Blob))?;
        }
        header.set(0, field, Value::Blob(Blob::from_table(table)))?;
        debug!("created waveform extension data table");
        Ok(())
    }

    /// Add a loop point row, creating the extension table if needed.
    pub fn add_waveform_extension_row(&mut self, loop_start: u32, loop_end: u32) -> Result<usize> {
        self.ensure_extension_table()?;
        self.table_mut(TableKind::WaveformExtensionData)?
            .add_row(&[("LoopStart", Value::U32(loop_start)), ("LoopEnd", Value::U32(loop_end))])
    }

    /// Add a synth row whose only child is waveform row `waveform_row`.
    pub fn add_synth_row(&mut self, waveform_row: usize) -> Result<usize> {
        let target = Reference::to_row(ReferenceKind::Waveform, waveform_row)?;
        self.table_mut(TableKind::Synth)?.add_row(&[
            ("Type", Value::U8(0)),
            ("VoiceLimitGroupName", Value::string("")),
            ("CommandIndex", Value::U16(NO_INDEX)),
            ("ReferenceItems", Value::bytes(target.to_bytes().to_vec())),
            ("LocalAisacs", empty_blob()),
            ("GlobalAisacStartIndex", Value::U16(NO_INDEX)),
            ("GlobalAisacNumRefs", Value::U16(0)),
            ("ControlWorkArea1", Value::U16(0)),
            ("ControlWorkArea2", Value::U16(0)),
            ("TrackValues", empty_blob()),
            ("ParameterPallet", Value::U16(NO_INDEX)),
            ("ActionTrackStartIndex", Value::U16(NO_INDEX)),
            ("NumActionTracks", Value::U16(0)),
        ])
    }

    /// Add an event stream row: `NoteOn(target)` plus a null end marker.
    pub fn add_track_event_row(&mut self, target: Reference) -> Result<usize> {
        let bytes = encode_commands(&[Command::note_on(target), Command::null()])?;
        self.table_mut(TableKind::TrackEvent)?.add_row(&[("Command", Value::bytes(bytes))])
    }

    /// Event stream row that plays synth row `synth_row`.
    pub fn add_synth_command_row(&mut self, synth_row: usize) -> Result<usize> {
        self.add_track_event_row(Reference::to_row(ReferenceKind::Synth, synth_row)?)
    }

    /// Add a track row driven by event row `event_row`.
    pub fn add_track_row(&mut self, event_row: usize) -> Result<usize> {
        let event = index_u16("event", event_row)?;
        self.table_mut(TableKind::Track)?.add_row(&[
            ("EventIndex", Value::U16(event)),
            ("CommandIndex", Value::U16(NO_INDEX)),
            ("LocalAisacs", empty_blob()),
            ("GlobalAisacStartIndex", Value::U16(NO_INDEX)),
            ("GlobalAisacNumRefs", Value::U16(0)),
            ("ParameterPallet", Value::U16(NO_INDEX)),
            ("TargetType", Value::U8(0)),
            ("TargetName", Value::string("")),
            ("TargetId", Value::U32(NO_ID)),
            ("TargetAcbName", Value::string("")),
            ("Scope", Value::U8(0)),
            ("TargetTrackNo", Value::U16(NO_INDEX)),
        ])
    }

    /// Add a sequence command row. The bytes must decode as a command stream.
    pub fn add_seq_command_row(&mut self, commands: Vec<u8>) -> Result<usize> {
        decode_commands(&commands)?;
        self.table_mut(TableKind::SeqCommand)?.add_row(&[("Command", Value::bytes(commands))])
    }

    /// Overwrite a sequence command row.
    pub fn set_seq_command_row(&mut self, row: usize, commands: Vec<u8>) -> Result<()> {
        decode_commands(&commands)?;
        self.table_mut(TableKind::SeqCommand)?.set(row, "Command", Value::bytes(commands))
    }

    /// Add a sequence playing `tracks` in order.
    pub fn add_sequence_row(&mut self, tracks: &[usize], command_row: Option<usize>) -> Result<usize> {
        let mut index = Vec::with_capacity(tracks.len() * 2);
        for &track in tracks {
            index.extend_from_slice(&index_u16("track", track)?.to_be_bytes());
        }
        let command = match command_row {
            Some(row) => index_u16("sequence command", row)?,
            None => NO_INDEX,
        };
        self.table_mut(TableKind::Sequence)?.add_row(&[
            ("PlaybackRatio", Value::U16(100)),
            ("NumTracks", Value::U64(tracks.len() as u64)),
            ("TrackIndex", Value::bytes(index)),
            ("CommandIndex", Value::U16(command)),
            ("LocalAisacs", empty_blob()),
            ("GlobalAisacStartIndex", Value::U16(NO_INDEX)),
            ("GlobalAisacNumRefs", Value::U16(0)),
            ("ParameterPallet", Value::U16(NO_INDEX)),
            ("ActionTrackStartIndex", Value::U16(NO_INDEX)),
            ("NumActionTracks", Value::U16(0)),
            ("TrackValues", empty_blob()),
            ("Type", Value::U8(0)),
            ("ControlWorkArea1", Value::U16(1)),
            ("ControlWorkArea2", Value::U16(1)),
        ])
    }

    /// Add a cue starting at sequence row `sequence_row`.
    ///
    /// Returns the cue id and row. Without an id the next id past the
    /// current maximum is used.
    pub fn add_cue_row(&mut self, length: u32, sequence_row: usize, cue_id: Option<u64>) -> Result<(u64, usize)> {
        let id = cue_id.unwrap_or_else(|| self.next_cue_id());
        if self.cue_row(id).is_some() {
            return Err(Error::DuplicateCueId(id));
        }
        let target = Reference::to_row(ReferenceKind::Sequence, sequence_row)?;
        let row = self.table_mut(TableKind::Cue)?.add_row(&[
            ("CueId", Value::U64(id)),
            ("ReferenceType", Value::U16(target.kind.as_u16())),
            ("ReferenceIndex", Value::U16(target.index)),
            ("UserData", Value::string("")),
            ("Worksize", Value::U16(0)),
            ("AisacControlMap", empty_blob()),
            ("Length", Value::U32(length)),
            ("NumAisacControlMaps", Value::U8(0)),
            ("HeaderVisibility", Value::U8(1)),
        ])?;
        self.index_cue(id, row);
        Ok((id, row))
    }

    /// Name the cue in row `cue_row`.
    pub fn add_cue_name_row(&mut self, name: &str, cue_row: usize) -> Result<usize> {
        let id = field_u64(self.table(TableKind::Cue)?, cue_row, "CueId")?;
        let index = index_u16("cue", cue_row)?;
        let row = self
            .table_mut(TableKind::CueName)?
            .add_row(&[("CueName", Value::string(name)), ("CueIndex", Value::U16(index))])?;
        self.index_cue_name(id, row);
        Ok(row)
    }

    // ------------------------------------------------------------------------
    // Composite operations
    // ------------------------------------------------------------------------

    /// Add a payload and the minimal chain that plays it:
    /// archive entry, waveform, synth, event stream, track, sequence command,
    /// sequence, cue and cue name.
    ///
    /// Without sequence commands the bytes of sequence command row 0 are
    /// copied (an empty stream if there is none). Returns the cue id and the
    /// cue name row.
    pub fn add_waveform_and_cue(
        &mut self,
        streaming: bool,
        payload: Vec<u8>,
        encode_type: EncodeType,
        cue_name: Option<&str>,
        cue_id: Option<u64>,
        sequence_commands: Option<Vec<u8>>,
    ) -> Result<(u64, usize)> {
        if let Some(id) = cue_id.filter(|&id| self.cue_row(id).is_some()) {
            return Err(Error::DuplicateCueId(id));
        }
        self.codecs().probe(encode_type, &payload)?;
        let sequence_commands = match sequence_commands {
            Some(bytes) => bytes,
            None => {
                let table = self.table(TableKind::SeqCommand)?;
                match table.row_count() {
                    0 => Vec::new(),
                    _ => table.blob(0, "Command")?.and_then(Blob::bytes).unwrap_or(&[]).to_vec(),
                }
            }
        };

        self.atomically(|s| {
            let awb_id = s.add_awb_entry(streaming, payload, None)?;
            let (info, waveform_row) = s.add_waveform_row(streaming, encode_type, awb_id)?;
            let synth_row = s.add_synth_row(waveform_row)?;
            let event_row = s.add_synth_command_row(synth_row)?;
            let track_row = s.add_track_row(event_row)?;
            let command_row = s.add_seq_command_row(sequence_commands)?;
            let sequence_row = s.add_sequence_row(&[track_row], Some(command_row))?;
            let (id, cue_row) = s.add_cue_row(info.duration_ms(), sequence_row, cue_id)?;
            let name = cue_name.map_or_else(|| format!("Cue{}", id), str::to_string);
            let name_row = s.add_cue_name_row(&name, cue_row)?;
            info!(cue_id = id, name = %name, awb_id, streaming, "added cue");
            Ok((id, name_row))
        })
    }

    /// Replace the payload of archive entry `awb_id` and update every
    /// waveform row that plays it.
    ///
    /// Loop points create or update an extension data row; without loop
    /// points the row's extension index is cleared and any old extension
    /// row is left in place.
    pub fn replace_waveform(
        &mut self,
        awb_id: u64,
        streaming: bool,
        payload: Vec<u8>,
        encode_type: EncodeType,
    ) -> Result<()> {
        let rows: Vec<usize> = self
            .waveform_rows(streaming, awb_id)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default();
        if rows.is_empty() {
            return Err(Error::UnknownArchiveId(awb_id));
        }
        let info = self.codecs().probe(encode_type, &payload)?;

        self.atomically(|s| {
            for &row in &rows {
                s.table_mut(TableKind::Waveform)?.set_row(row, &[
                    ("EncodeType", Value::U8(encode_type.0)),
                    ("NumChannels", Value::U32(info.channel_count)),
                    ("SamplingRate", Value::U32(info.sample_rate)),
                    ("NumSamples", Value::U32(info.sample_count)),
                ])?;
                match info.loop_points {
                    Some(lp) => {
                        let ext = opt_u64(s.table(TableKind::Waveform)?, row, "ExtensionData")?
                            .unwrap_or(NO_INDEX as u64);
                        if ext == NO_INDEX as u64 {
                            let ext = s.add_waveform_extension_row(lp.start, lp.end)?;
                            s.table_mut(TableKind::Waveform)?
                                .set(row, "ExtensionData", Value::U64(ext as u64))?;
                        } else {
                            s.table_mut(TableKind::WaveformExtensionData)?.set_row(ext as usize, &[
                                ("LoopStart", Value::U32(lp.start)),
                                ("LoopEnd", Value::U32(lp.end)),
                            ])?;
                        }
                        s.table_mut(TableKind::Waveform)?.set(row, "LoopFlag", Value::U8(2))?;
                    }
                    None => {
                        s.table_mut(TableKind::Waveform)?.set_row(row, &[
                            ("LoopFlag", Value::U8(1)),
                            ("ExtensionData", Value::U16(NO_INDEX)),
                        ])?;
                    }
                }
            }
            s.archive_mut(streaming)?.replace_payload(awb_id, payload)?;
            if streaming {
                s.sync_stream_header()?;
                s.refresh_hash()?;
            }
            info!(awb_id, streaming, rows = rows.len(), "replaced waveform");
            Ok(())
        })
    }
}
