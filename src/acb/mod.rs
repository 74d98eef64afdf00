//! Cue sheets.
//!
//! A cue sheet is a single-row @UTF header table whose blob cells hold the
//! named sub-tables (`CueTable`, `WaveformTable`, ...) and the embedded
//! memory archive. Streamed waveforms live in a companion AFS2 file; the
//! header keeps an MD5 of that file and a header-only copy of its index.
//!
//! - [`CueSheet`] - loading, table access and cross-reference indices
//! - [`Visitor`] - typed walk over the cue graph
//! - [`decode_commands`] - parameter and event bytecode
//!
//! ## Example
//!
//! ```ignore
//! use std::path::Path;
//! use acb::acb::{CueSheet, LoadOptions};
//!
//! let sheet = CueSheet::open("bgm.acb", Some(Path::new("bgm.awb")), &LoadOptions::default())?;
//! for cue in sheet.cues()? {
//!     println!("{} {:?}", cue.id, cue.name);
//! }
//! ```

mod builder;
mod command;
mod extract;
mod hash;
mod reference;
mod resolve;

pub use command::*;
pub use extract::*;
pub use hash::*;
pub use reference::*;
pub use resolve::*;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::afs2::Archive;
use crate::codec::CodecRegistry;
use crate::utf::Table;
use crate::util::{Error, FileBytes, Result};

/// Header field holding the embedded memory archive.
pub const MEMORY_ARCHIVE_FIELD: &str = "AwbFile";

// ============================================================================
// Table names and version variants
// ============================================================================

/// Sub-tables reachable from the header row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Cue,
    CueName,
    Waveform,
    Synth,
    Track,
    Sequence,
    OutsideLink,
    StringValue,
    WaveformExtensionData,
    GlobalAisacReference,
    AcfReference,
    TrackEvent,
    TrackCommand,
    SynthCommand,
    SeqCommand,
}

impl TableKind {
    /// Table name as stored in the nested table header.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cue => "Cue",
            Self::CueName => "CueName",
            Self::Waveform => "Waveform",
            Self::Synth => "Synth",
            Self::Track => "Track",
            Self::Sequence => "Sequence",
            Self::OutsideLink => "OutsideLink",
            Self::StringValue => "StringValue",
            Self::WaveformExtensionData => "WaveformExtensionData",
            Self::GlobalAisacReference => "GlobalAisacReference",
            Self::AcfReference => "AcfReference",
            Self::TrackEvent => "TrackEvent",
            Self::TrackCommand => "TrackCommand",
            Self::SynthCommand => "SynthCommand",
            Self::SeqCommand => "SeqCommand",
        }
    }

    fn is_command(self) -> bool {
        matches!(self, Self::TrackEvent | Self::TrackCommand | Self::SynthCommand | Self::SeqCommand)
    }

    /// Header field holding this table.
    pub fn field(self, layout: CommandLayout) -> &'static str {
        if self.is_command() && layout == CommandLayout::Shared {
            return "CommandTable";
        }
        match self {
            Self::Cue => "CueTable",
            Self::CueName => "CueNameTable",
            Self::Waveform => "WaveformTable",
            Self::Synth => "SynthTable",
            Self::Track => "TrackTable",
            Self::Sequence => "SequenceTable",
            Self::OutsideLink => "OutsideLinkTable",
            Self::StringValue => "StringValueTable",
            Self::WaveformExtensionData => "WaveformExtensionDataTable",
            Self::GlobalAisacReference => "GlobalAisacReferenceTable",
            Self::AcfReference => "AcfReferenceTable",
            Self::TrackEvent => "TrackEventTable",
            Self::TrackCommand => "TrackCommandTable",
            Self::SynthCommand => "SynthCommandTable",
            Self::SeqCommand => "SeqCommandTable",
        }
    }
}

/// Where command streams are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandLayout {
    /// One table per stream kind.
    Separate,
    /// A single `CommandTable` for all of them (older sheets).
    Shared,
}

/// How waveform rows name their archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdScheme {
    /// One `Id` field for either archive.
    Simple,
    /// `MemoryAwbId` and `StreamAwbId`; the unused one holds 0xFFFF.
    Split,
}

/// Options for [`CueSheet::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Compare the stored content hash with the companion archive bytes.
    pub verify_hash: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { verify_hash: true }
    }
}

/// Summary of one cue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CueInfo {
    pub id: u64,
    pub row: usize,
    pub name: Option<String>,
    /// Length in milliseconds; 0 or 0xFFFFFFFF when unknown.
    pub length: u64,
    pub reference: Reference,
}

// ============================================================================
// Cue sheet
// ============================================================================

/// A loaded cue sheet with its optional companion archive.
#[derive(Clone, Debug)]
pub struct CueSheet {
    header: Table,
    stream: Option<Archive>,
    codecs: CodecRegistry,
    commands: CommandLayout,
    ids: IdScheme,
    cue_rows: BTreeMap<u64, usize>,
    cue_name_rows: BTreeMap<u64, usize>,
    memory_waveforms: BTreeMap<u64, BTreeSet<usize>>,
    stream_waveforms: BTreeMap<u64, BTreeSet<usize>>,
    hash_status: HashStatus,
}

/// Integer field value; a field without storage is an error.
pub(crate) fn field_u64(table: &Table, row: usize, name: &str) -> Result<u64> {
    table.uint(row, name)?.ok_or_else(|| Error::NoStorage(name.to_string()))
}

/// Integer field value, `None` when the schema lacks the field.
pub(crate) fn opt_u64(table: &Table, row: usize, name: &str) -> Result<Option<u64>> {
    if !table.has_field(name) {
        return Ok(None);
    }
    table.uint(row, name)
}

pub(crate) fn opt_text(table: &Table, row: usize, name: &str) -> Result<Option<String>> {
    if !table.has_field(name) {
        return Ok(None);
    }
    Ok(table.string(row, name)?.map(|s| s.text().into_owned()))
}

/// Archive entry id of a waveform row.
pub(crate) fn waveform_archive_id(
    waveforms: &Table,
    ids: IdScheme,
    row: usize,
    streaming: bool,
) -> Result<u64> {
    match ids {
        IdScheme::Simple => field_u64(waveforms, row, "Id"),
        IdScheme::Split => {
            let (own, other) = if streaming {
                ("StreamAwbId", "MemoryAwbId")
            } else {
                ("MemoryAwbId", "StreamAwbId")
            };
            if field_u64(waveforms, row, other)? != NO_INDEX as u64 {
                return Err(Error::InconsistentIdField { row, streaming });
            }
            field_u64(waveforms, row, own)
        }
    }
}

impl CueSheet {
    /// Build a cue sheet from a parsed header table.
    ///
    /// No hash or header summary checks are made; see [`CueSheet::load`].
    pub fn new(header: Table, stream: Option<Archive>) -> Result<Self> {
        if header.row_count() == 0 {
            return Err(Error::format("cue sheet header has no rows"));
        }
        let version = version_string(opt_u64(&header, 0, "Version")?.unwrap_or(0) as u32);

        let separate = [TableKind::TrackEvent, TableKind::TrackCommand, TableKind::SynthCommand, TableKind::SeqCommand]
            .iter()
            .all(|k| header.has_field(k.field(CommandLayout::Separate)));
        let commands = if separate {
            CommandLayout::Separate
        } else if header.has_field("CommandTable") {
            CommandLayout::Shared
        } else {
            return Err(Error::format(format!("unknown cue sheet version {}: no command tables", version)));
        };

        let mut sheet = Self {
            header,
            stream,
            codecs: CodecRegistry::default(),
            commands,
            ids: IdScheme::Simple,
            cue_rows: BTreeMap::new(),
            cue_name_rows: BTreeMap::new(),
            memory_waveforms: BTreeMap::new(),
            stream_waveforms: BTreeMap::new(),
            hash_status: HashStatus::NotChecked,
        };

        let waveforms = sheet.table(TableKind::Waveform)?;
        sheet.ids = if waveforms.has_field("Id") {
            IdScheme::Simple
        } else if waveforms.has_field("MemoryAwbId") && waveforms.has_field("StreamAwbId") {
            IdScheme::Split
        } else {
            return Err(Error::format(format!("unknown cue sheet version {}: no waveform id field", version)));
        };
        for kind in [TableKind::Synth, TableKind::Track, TableKind::Sequence, TableKind::TrackEvent] {
            sheet.table(kind)?;
        }
        sheet.rebuild_index()?;
        debug!(
            version = %version,
            commands = ?sheet.commands,
            ids = ?sheet.ids,
            cues = sheet.cue_rows.len(),
            "loaded cue sheet"
        );
        Ok(sheet)
    }

    /// Parse a cue sheet and, optionally, its companion archive.
    pub fn load(acb: &[u8], awb: Option<&[u8]>, options: &LoadOptions) -> Result<Self> {
        let header = Table::parse(acb)?;
        let stream = awb.map(Archive::parse).transpose()?;
        let mut sheet = Self::new(header, stream)?;
        if let Some(bytes) = awb {
            sheet.check_stream_header();
            if options.verify_hash {
                sheet.hash_status = sheet.verify_stream_hash(bytes)?;
            }
        }
        Ok(sheet)
    }

    /// Read a cue sheet and optional companion archive from disk.
    pub fn open(acb: impl AsRef<Path>, awb: Option<&Path>, options: &LoadOptions) -> Result<Self> {
        let acb_bytes = FileBytes::open(acb.as_ref())?;
        let awb_bytes = awb.map(FileBytes::open).transpose()?;
        Self::load(&acb_bytes, awb_bytes.as_deref(), options)
    }

    /// Write the cue sheet and, when given a path, the companion archive.
    pub fn save(&self, acb: impl AsRef<Path>, awb: Option<&Path>) -> Result<()> {
        fs::write(acb.as_ref(), self.to_bytes()?)?;
        info!(path = %acb.as_ref().display(), "wrote cue sheet");
        if let Some(path) = awb {
            let bytes = self
                .stream_to_bytes()?
                .ok_or_else(|| Error::other("cue sheet has no companion archive to write"))?;
            fs::write(path, bytes)?;
            info!(path = %path.display(), "wrote companion archive");
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.header.to_bytes()
    }

    pub fn stream_to_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.stream.as_ref().map(Archive::to_bytes).transpose()
    }

    /// Run `f`, restoring the previous state if it fails.
    pub(crate) fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        let out = f(self);
        if out.is_err() {
            *self = snapshot;
        }
        out
    }

    // ------------------------------------------------------------------------
    // Indices
    // ------------------------------------------------------------------------

    fn rebuild_index(&mut self) -> Result<()> {
        let cues = self.table(TableKind::Cue)?;
        let mut cue_rows = BTreeMap::new();
        for row in 0..cues.row_count() {
            let id = field_u64(cues, row, "CueId")?;
            if cue_rows.insert(id, row).is_some() {
                return Err(Error::DuplicateCueId(id));
            }
        }

        let names = self.table(TableKind::CueName)?;
        let mut cue_name_rows = BTreeMap::new();
        for row in 0..names.row_count() {
            let cue_row = field_u64(names, row, "CueIndex")? as usize;
            cue_name_rows.insert(field_u64(cues, cue_row, "CueId")?, row);
        }

        let waveforms = self.table(TableKind::Waveform)?;
        let mut memory: BTreeMap<u64, BTreeSet<usize>> = BTreeMap::new();
        let mut stream: BTreeMap<u64, BTreeSet<usize>> = BTreeMap::new();
        for row in 0..waveforms.row_count() {
            let streaming = field_u64(waveforms, row, "Streaming")? != 0;
            let id = waveform_archive_id(waveforms, self.ids, row, streaming)?;
            let map = if streaming { &mut stream } else { &mut memory };
            map.entry(id).or_default().insert(row);
        }

        self.cue_rows = cue_rows;
        self.cue_name_rows = cue_name_rows;
        self.memory_waveforms = memory;
        self.stream_waveforms = stream;
        Ok(())
    }

    pub(crate) fn index_cue(&mut self, id: u64, row: usize) {
        self.cue_rows.insert(id, row);
    }

    pub(crate) fn index_cue_name(&mut self, id: u64, row: usize) {
        self.cue_name_rows.insert(id, row);
    }

    pub(crate) fn index_waveform(&mut self, streaming: bool, awb_id: u64, row: usize) {
        let map = if streaming { &mut self.stream_waveforms } else { &mut self.memory_waveforms };
        map.entry(awb_id).or_default().insert(row);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn header(&self) -> &Table {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut Table {
        &mut self.header
    }

    #[inline]
    pub fn command_layout(&self) -> CommandLayout {
        self.commands
    }

    #[inline]
    pub fn id_scheme(&self) -> IdScheme {
        self.ids
    }

    #[inline]
    pub fn hash_status(&self) -> HashStatus {
        self.hash_status
    }

    pub(crate) fn set_hash_status(&mut self, status: HashStatus) {
        self.hash_status = status;
    }

    #[inline]
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Replace the codec registry used for probing and decryption.
    pub fn set_codecs(&mut self, codecs: CodecRegistry) {
        self.codecs = codecs;
    }

    /// Raw `Version` header value.
    pub fn version(&self) -> Result<u32> {
        Ok(opt_u64(&self.header, 0, "Version")?.unwrap_or(0) as u32)
    }

    /// Version as dotted hex bytes, most significant first.
    pub fn version_string(&self) -> Result<String> {
        Ok(version_string(self.version()?))
    }

    /// `Name` header value.
    pub fn name(&self) -> Result<Option<String>> {
        opt_text(&self.header, 0, "Name")
    }

    /// A named sub-table; fails when the field is missing or holds no table.
    pub fn table(&self, kind: TableKind) -> Result<&Table> {
        self.table_opt(kind).ok_or_else(|| Error::MissingTable(kind.name().to_string()))
    }

    /// A named sub-table, if present.
    pub fn table_opt(&self, kind: TableKind) -> Option<&Table> {
        let field = kind.field(self.commands);
        if !self.header.has_field(field) {
            return None;
        }
        self.header.table(0, field).ok().flatten()
    }

    pub(crate) fn table_mut(&mut self, kind: TableKind) -> Result<&mut Table> {
        let field = kind.field(self.commands);
        self.header
            .table_mut(0, field)?
            .ok_or_else(|| Error::MissingTable(kind.name().to_string()))
    }

    /// The embedded memory archive, if present.
    pub fn memory_archive(&self) -> Option<&Archive> {
        if !self.header.has_field(MEMORY_ARCHIVE_FIELD) {
            return None;
        }
        self.header.archive(0, MEMORY_ARCHIVE_FIELD).ok().flatten()
    }

    /// The companion stream archive, if loaded.
    #[inline]
    pub fn stream_archive(&self) -> Option<&Archive> {
        self.stream.as_ref()
    }

    pub(crate) fn stream_archive_mut(&mut self) -> Option<&mut Archive> {
        self.stream.as_mut()
    }

    pub(crate) fn set_stream_archive(&mut self, archive: Archive) {
        self.stream = Some(archive);
    }

    /// The archive waveforms with this streaming flag read from.
    pub fn archive(&self, streaming: bool) -> Option<&Archive> {
        if streaming {
            self.stream_archive()
        } else {
            self.memory_archive()
        }
    }

    /// Cue ids in ascending order.
    pub fn cue_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.cue_rows.keys().copied()
    }

    pub fn cue_row(&self, id: u64) -> Option<usize> {
        self.cue_rows.get(&id).copied()
    }

    pub fn cue_name_row(&self, id: u64) -> Option<usize> {
        self.cue_name_rows.get(&id).copied()
    }

    pub fn cue_name(&self, id: u64) -> Result<Option<String>> {
        match self.cue_name_row(id) {
            Some(row) => opt_text(self.table(TableKind::CueName)?, row, "CueName"),
            None => Ok(None),
        }
    }

    /// One past the largest cue id. Cue ids start at 1.
    pub fn next_cue_id(&self) -> u64 {
        self.cue_rows.keys().next_back().map_or(1, |m| m + 1)
    }

    /// Waveform rows whose payload is archive entry `awb_id`.
    pub fn waveform_rows(&self, streaming: bool, awb_id: u64) -> Option<&BTreeSet<usize>> {
        let map = if streaming { &self.stream_waveforms } else { &self.memory_waveforms };
        map.get(&awb_id)
    }

    /// Reference a cue row starts from.
    pub fn cue_reference(&self, row: usize) -> Result<Reference> {
        let cues = self.table(TableKind::Cue)?;
        Reference::from_raw(
            field_u64(cues, row, "ReferenceType")?,
            field_u64(cues, row, "ReferenceIndex")?,
        )
    }

    /// Every cue, ordered by id.
    pub fn cues(&self) -> Result<Vec<CueInfo>> {
        let cues = self.table(TableKind::Cue)?;
        self.cue_rows
            .iter()
            .map(|(&id, &row)| {
                Ok(CueInfo {
                    id,
                    row,
                    name: self.cue_name(id)?,
                    length: opt_u64(cues, row, "Length")?.unwrap_or(0),
                    reference: self.cue_reference(row)?,
                })
            })
            .collect()
    }

    /// Category id to name, from ACF reference rows of type 3.
    pub fn acf_categories(&self) -> Result<BTreeMap<u64, String>> {
        let mut out = BTreeMap::new();
        let Some(refs) = self.table_opt(TableKind::AcfReference) else {
            return Ok(out);
        };
        for row in 0..refs.row_count() {
            if field_u64(refs, row, "Type")? == 3 {
                let name = opt_text(refs, row, "Name")?.unwrap_or_default();
                out.insert(field_u64(refs, row, "Id")?, name);
            }
        }
        Ok(out)
    }

    /// Entry of the string value table.
    pub fn string_value(&self, index: u64) -> Result<Option<String>> {
        opt_text(self.table(TableKind::StringValue)?, index as usize, "StringValue")
    }
}

/// Dotted hex rendering of a packed version number.
pub fn version_string(version: u32) -> String {
    version
        .to_be_bytes()
        .iter()
        .map(|b| format!("{:x}", b))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string() {
        assert_eq!(version_string(0x0130_0000), "1.30.0.0");
        assert_eq!(version_string(0x01_2C_01_00), "1.2c.1.0");
    }

    #[test]
    fn test_table_fields() {
        assert_eq!(TableKind::Cue.field(CommandLayout::Separate), "CueTable");
        assert_eq!(TableKind::SeqCommand.field(CommandLayout::Separate), "SeqCommandTable");
        assert_eq!(TableKind::SeqCommand.field(CommandLayout::Shared), "CommandTable");
        assert_eq!(TableKind::Waveform.field(CommandLayout::Shared), "WaveformTable");
    }
}
