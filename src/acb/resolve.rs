//! Cue graph traversal.
//!
//! A walk starts from a [`Reference`] and descends by kind:
//!
//! ```text
//! Cue -> Sequence -> Track* -> (event stream) NoteOn -> Synth -> Waveform
//!                                                    \-> Waveform
//! ```
//!
//! Each node is reported to a [`Visitor`] before its children. A command
//! stream that fails to decode is reported through
//! [`Visitor::command_error`] and only that stream is dropped; the rest of
//! the walk continues.

use tracing::warn;

use crate::codec::{EncodeType, LoopPoints};
use crate::utf::{Blob, Table};
use crate::util::{Error, Result};

use super::{
    decode_commands, field_u64, opt_text, opt_u64, waveform_archive_id, Command, CueSheet,
    Reference, ReferenceKind, SequenceType, TableKind, NO_INDEX,
};

/// Nesting limit for a single walk.
pub const MAX_DEPTH: usize = 64;

/// Position of a node within a walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Visit {
    pub depth: usize,
    /// Position among the parent's children.
    pub ordinal: usize,
    /// Track and note ordinals from the root.
    pub path: Vec<usize>,
}

impl Visit {
    fn child(&self, ordinal: usize, extend_path: bool) -> Self {
        let mut path = self.path.clone();
        if extend_path {
            path.push(ordinal);
        }
        Self { depth: self.depth + 1, ordinal, path }
    }

    /// `.a.b.c` form of the path; empty at the root.
    pub fn path_suffix(&self) -> String {
        self.path.iter().map(|p| format!(".{}", p)).collect()
    }
}

/// A waveform leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformNode<'a> {
    pub row: usize,
    pub streaming: bool,
    pub awb_id: u64,
    pub encode_type: EncodeType,
    pub channel_count: u64,
    pub sample_rate: u64,
    pub sample_count: u64,
    /// 2 loops; 0 and 1 do not.
    pub loop_flag: u64,
    /// Loop points from the extension data row.
    pub loop_points: Option<LoopPoints>,
    /// `None` when the archive or its entry is not loaded.
    pub payload: Option<&'a [u8]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SynthNode {
    pub row: usize,
    pub commands: Vec<Command>,
    pub global_aisacs: Vec<String>,
    pub children: Vec<Reference>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceNode {
    pub row: usize,
    pub sequence_type: Option<SequenceType>,
    /// Percent of normal speed.
    pub playback_ratio: u64,
    pub commands: Vec<Command>,
    pub global_aisacs: Vec<String>,
    /// Track rows in playback order.
    pub tracks: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackNode {
    pub row: usize,
    pub commands: Vec<Command>,
    pub global_aisacs: Vec<String>,
    pub events: Vec<Command>,
}

/// A link to a cue by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkNode {
    pub row: usize,
    pub cue_id: u64,
}

/// Callbacks for [`CueSheet::walk`]. Every method defaults to doing nothing.
pub trait Visitor {
    fn waveform(&mut self, _at: &Visit, _node: &WaveformNode<'_>) -> Result<()> {
        Ok(())
    }

    fn synth(&mut self, _at: &Visit, _node: &SynthNode) -> Result<()> {
        Ok(())
    }

    fn sequence(&mut self, _at: &Visit, _node: &SequenceNode) -> Result<()> {
        Ok(())
    }

    fn track(&mut self, _at: &Visit, _node: &TrackNode) -> Result<()> {
        Ok(())
    }

    /// A non-structural command of a track's event stream.
    fn event(&mut self, _at: &Visit, _command: &Command) -> Result<()> {
        Ok(())
    }

    fn linked_cue(&mut self, _at: &Visit, _link: &LinkNode) -> Result<()> {
        Ok(())
    }

    /// A reference kind the walk does not descend into.
    fn unsupported(&mut self, _at: &Visit, _reference: Reference) -> Result<()> {
        Ok(())
    }

    fn command_error(&mut self, _at: &Visit, _error: &Error) -> Result<()> {
        Ok(())
    }

    /// A child reference that does not decode. The walk skips it.
    fn reference_error(&mut self, _at: &Visit, _error: &Error) -> Result<()> {
        Ok(())
    }
}

/// Raw bytes of a blob cell; empty when the cell is empty or not raw.
fn blob_bytes<'a>(table: &'a Table, row: usize, name: &str) -> Result<&'a [u8]> {
    Ok(table.blob(row, name)?.and_then(Blob::bytes).unwrap_or(&[]))
}

impl CueSheet {
    /// Walk the graph below the cue with this id.
    pub fn walk_cue<V: Visitor + ?Sized>(&self, cue_id: u64, visitor: &mut V) -> Result<()> {
        let row = self
            .cue_row(cue_id)
            .ok_or_else(|| Error::other(format!("no cue with id {}", cue_id)))?;
        self.walk(self.cue_reference(row)?, visitor)
    }

    /// Walk the graph below `reference`.
    pub fn walk<V: Visitor + ?Sized>(&self, reference: Reference, visitor: &mut V) -> Result<()> {
        self.visit(reference, &Visit::default(), visitor)
    }

    fn visit<V: Visitor + ?Sized>(&self, reference: Reference, at: &Visit, v: &mut V) -> Result<()> {
        if at.depth > MAX_DEPTH {
            return Err(Error::format(format!(
                "cue graph nested deeper than {} levels at {}",
                MAX_DEPTH, reference
            )));
        }
        match reference.kind {
            ReferenceKind::Waveform => v.waveform(at, &self.waveform_node(reference.row())?),
            ReferenceKind::Synth | ReferenceKind::LinkedSynth => {
                let node = self.synth_node(reference.row(), at, v)?;
                v.synth(at, &node)?;
                for (i, child) in node.children.iter().enumerate() {
                    self.visit(*child, &at.child(i, false), v)?;
                }
                Ok(())
            }
            ReferenceKind::Sequence | ReferenceKind::LinkedSequence => {
                let node = self.sequence_node(reference.row(), at, v)?;
                v.sequence(at, &node)?;
                for (i, track) in node.tracks.iter().enumerate() {
                    self.visit(Reference::new(ReferenceKind::Track, *track), &at.child(i, true), v)?;
                }
                Ok(())
            }
            ReferenceKind::Track => {
                let node = self.track_node(reference.row(), at, v)?;
                v.track(at, &node)?;
                let mut ordinal = 0;
                for command in &node.events {
                    match command.note_target() {
                        Some(Ok(target)) => {
                            self.visit(target, &at.child(ordinal, true), v)?;
                            ordinal += 1;
                        }
                        Some(Err(e)) => {
                            self.skip_reference(TableKind::Track, reference.row(), e, at, v)?;
                            ordinal += 1;
                        }
                        None => v.event(at, command)?,
                    }
                }
                Ok(())
            }
            ReferenceKind::LinkedCue => match self.link_node(reference.row())? {
                Some(link) => v.linked_cue(at, &link),
                None => v.unsupported(at, reference),
            },
            ReferenceKind::Null | ReferenceKind::BlockSequence | ReferenceKind::LinkedBlockSequence => {
                v.unsupported(at, reference)
            }
        }
    }

    /// Decode the command stream in row `index` of `kind`.
    ///
    /// The 0xFFFF sentinel yields no commands; a malformed stream is
    /// reported to the visitor and also yields no commands.
    fn commands<V: Visitor + ?Sized>(
        &self,
        kind: TableKind,
        index: Option<u64>,
        at: &Visit,
        v: &mut V,
    ) -> Result<Vec<Command>> {
        let Some(index) = index.filter(|&i| i != NO_INDEX as u64) else {
            return Ok(Vec::new());
        };
        let bytes = blob_bytes(self.table(kind)?, index as usize, "Command")?;
        match decode_commands(bytes) {
            Ok(commands) => Ok(commands),
            Err(e) if e.is_command() => {
                warn!(table = kind.name(), row = index, error = %e, "skipping malformed command stream");
                v.command_error(at, &e)?;
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Report a child reference that does not decode. Errors other than
    /// format errors stop the walk.
    fn skip_reference<V: Visitor + ?Sized>(
        &self,
        kind: TableKind,
        row: usize,
        error: Error,
        at: &Visit,
        v: &mut V,
    ) -> Result<()> {
        if !error.is_format() {
            return Err(error);
        }
        warn!(table = kind.name(), row, error = %error, "skipping malformed reference");
        v.reference_error(at, &error)
    }

    /// Names from the global AISAC reference table.
    fn global_aisacs(&self, table: &Table, row: usize) -> Result<Vec<String>> {
        let start = opt_u64(table, row, "GlobalAisacStartIndex")?.unwrap_or(NO_INDEX as u64);
        let count = opt_u64(table, row, "GlobalAisacNumRefs")?.unwrap_or(0);
        if start == NO_INDEX as u64 || count == 0 {
            return Ok(Vec::new());
        }
        let refs = self.table(TableKind::GlobalAisacReference)?;
        (start..start.saturating_add(count))
            .map(|i| Ok(opt_text(refs, i as usize, "Name")?.unwrap_or_default()))
            .collect()
    }

    /// Resolve a waveform row to its metadata and payload.
    pub fn waveform_node(&self, row: usize) -> Result<WaveformNode<'_>> {
        let waveforms = self.table(TableKind::Waveform)?;
        let streaming = field_u64(waveforms, row, "Streaming")? != 0;
        let awb_id = waveform_archive_id(waveforms, self.id_scheme(), row, streaming)?;
        let encode_type = EncodeType(field_u64(waveforms, row, "EncodeType")? as u8);

        let ext = opt_u64(waveforms, row, "ExtensionData")?.unwrap_or(NO_INDEX as u64);
        let loop_points = match self.table_opt(TableKind::WaveformExtensionData) {
            Some(t) if ext != NO_INDEX as u64 => Some(LoopPoints {
                start: field_u64(t, ext as usize, "LoopStart")? as u32,
                end: field_u64(t, ext as usize, "LoopEnd")? as u32,
            }),
            _ => None,
        };

        Ok(WaveformNode {
            row,
            streaming,
            awb_id,
            encode_type,
            channel_count: opt_u64(waveforms, row, "NumChannels")?.unwrap_or(0),
            sample_rate: opt_u64(waveforms, row, "SamplingRate")?.unwrap_or(0),
            sample_count: opt_u64(waveforms, row, "NumSamples")?.unwrap_or(0),
            loop_flag: opt_u64(waveforms, row, "LoopFlag")?.unwrap_or(0),
            loop_points,
            payload: self.archive(streaming).and_then(|a| a.payload(awb_id)),
        })
    }

    fn synth_node<V: Visitor + ?Sized>(&self, row: usize, at: &Visit, v: &mut V) -> Result<SynthNode> {
        let synths = self.table(TableKind::Synth)?;
        let command_index = opt_u64(synths, row, "CommandIndex")?;
        let commands = self.commands(TableKind::SynthCommand, command_index, at, v)?;
        let children = match Reference::decode_items(blob_bytes(synths, row, "ReferenceItems")?) {
            Ok(children) => children,
            Err(e) => {
                self.skip_reference(TableKind::Synth, row, e, at, v)?;
                Vec::new()
            }
        };
        Ok(SynthNode { row, commands, global_aisacs: self.global_aisacs(synths, row)?, children })
    }

    fn sequence_node<V: Visitor + ?Sized>(&self, row: usize, at: &Visit, v: &mut V) -> Result<SequenceNode> {
        let sequences = self.table(TableKind::Sequence)?;
        let count = field_u64(sequences, row, "NumTracks")? as usize;
        let index = blob_bytes(sequences, row, "TrackIndex")?;
        if index.len() < count * 2 {
            return Err(Error::format(format!(
                "sequence {} lists {} tracks in {} index bytes",
                row,
                count,
                index.len()
            )));
        }
        let tracks = index[..count * 2]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let command_index = opt_u64(sequences, row, "CommandIndex")?;
        Ok(SequenceNode {
            row,
            sequence_type: SequenceType::from_u8(opt_u64(sequences, row, "Type")?.unwrap_or(0) as u8),
            playback_ratio: opt_u64(sequences, row, "PlaybackRatio")?.unwrap_or(100),
            commands: self.commands(TableKind::SeqCommand, command_index, at, v)?,
            global_aisacs: self.global_aisacs(sequences, row)?,
            tracks,
        })
    }

    fn track_node<V: Visitor + ?Sized>(&self, row: usize, at: &Visit, v: &mut V) -> Result<TrackNode> {
        let tracks = self.table(TableKind::Track)?;
        let command_index = opt_u64(tracks, row, "CommandIndex")?;
        let event_index = opt_u64(tracks, row, "EventIndex")?;
        Ok(TrackNode {
            row,
            commands: self.commands(TableKind::TrackCommand, command_index, at, v)?,
            global_aisacs: self.global_aisacs(tracks, row)?,
            events: self.commands(TableKind::TrackEvent, event_index, at, v)?,
        })
    }

    /// A link row without an external sheet name; `None` otherwise.
    fn link_node(&self, row: usize) -> Result<Option<LinkNode>> {
        let Some(links) = self.table_opt(TableKind::OutsideLink) else {
            return Ok(None);
        };
        if opt_u64(links, row, "AcbNameStringIndex")?.unwrap_or(NO_INDEX as u64) != NO_INDEX as u64 {
            return Ok(None);
        }
        Ok(Some(LinkNode { row, cue_id: field_u64(links, row, "Id")? }))
    }
}
