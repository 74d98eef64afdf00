//! Archive model and mutation.

use tracing::debug;

use crate::util::{align_up, Error, Result};

use super::{
    header_size, width_max, AFS2_ALIGN, DEFAULT_ID_WIDTH, DEFAULT_POSITION_WIDTH, DEFAULT_VERSION,
};

/// One archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    id: u64,
    /// Stored (unaligned) position.
    position: u64,
    /// Start of the payload.
    offset: u64,
    /// End of the payload (next stored position).
    end: u64,
    /// Payload bytes; `None` in a header-only archive.
    data: Option<Vec<u8>>,
}

impl Entry {
    pub(crate) fn new(id: u64, position: u64, offset: u64, end: u64, data: Option<Vec<u8>>) -> Self {
        Self { id, position, offset, end, data }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.end - self.offset
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }
}

/// An AFS2 archive, full or header-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Archive {
    pub(crate) version: u8,
    pub(crate) position_width: u8,
    pub(crate) id_width: u8,
    pub(crate) reserved: u8,
    pub(crate) align: u16,
    pub(crate) key: u16,
    pub(crate) entries: Vec<Entry>,
    pub(crate) end_position: u64,
    pub(crate) header_only: bool,
    /// Zero bytes after the last entry of a standalone file.
    pub(crate) tail_padding: u32,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Archive {
    /// Create an empty full archive.
    pub fn new(key: u16) -> Self {
        Self {
            version: DEFAULT_VERSION,
            position_width: DEFAULT_POSITION_WIDTH,
            id_width: DEFAULT_ID_WIDTH,
            reserved: 0,
            align: AFS2_ALIGN,
            key,
            entries: Vec::new(),
            end_position: header_size(0, DEFAULT_POSITION_WIDTH, DEFAULT_ID_WIDTH) as u64,
            header_only: false,
            tail_padding: 0,
        }
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[inline]
    pub fn key(&self) -> u16 {
        self.key
    }

    #[inline]
    pub fn align(&self) -> u16 {
        self.align
    }

    #[inline]
    pub fn id_width(&self) -> u8 {
        self.id_width
    }

    #[inline]
    pub fn position_width(&self) -> u8 {
        self.position_width
    }

    #[inline]
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    #[inline]
    pub fn tail_padding(&self) -> u32 {
        self.tail_padding
    }

    /// True when entry payloads were not present at parse time.
    #[inline]
    pub fn is_header_only(&self) -> bool {
        self.header_only
    }

    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn header_size(&self) -> usize {
        header_size(self.entries.len(), self.position_width, self.id_width)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(Entry::id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn entry(&self, id: u64) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Payload of entry `id`, when present.
    pub fn payload(&self, id: u64) -> Option<&[u8]> {
        self.entry(id).and_then(Entry::data)
    }

    /// Next id `append` would assign: one past the largest id, or 0.
    pub fn next_id(&self) -> u64 {
        self.ids().max().map_or(0, |m| m + 1)
    }

    /// Recompute every position and the end position from payload lengths.
    pub fn relayout(&mut self) {
        if self.header_only {
            return;
        }
        let align = self.align.max(1) as u64;
        let mut pos = self.header_size() as u64;
        for e in &mut self.entries {
            let len = e.data.as_ref().map_or(0, |d| d.len() as u64);
            e.position = pos;
            e.offset = align_up(pos, align);
            e.end = e.offset + len;
            pos = e.end;
        }
        self.end_position = pos;
    }

    /// Append an entry and return its id.
    ///
    /// Without an explicit id, the next id past the current maximum is used.
    pub fn append(&mut self, id: Option<u64>, data: Vec<u8>) -> Result<u64> {
        if self.header_only {
            return Err(Error::Layout("cannot append to a header-only archive".into()));
        }
        let id = match id {
            Some(id) if self.contains(id) => return Err(Error::DuplicateId(id)),
            Some(id) => id,
            None => self.next_id(),
        };
        if id > width_max(self.id_width) {
            return Err(Error::Layout(format!(
                "id {} does not fit in {} bytes",
                id, self.id_width
            )));
        }
        debug!(id, size = data.len(), "appending archive entry");
        self.entries.push(Entry::new(id, 0, 0, 0, Some(data)));
        self.relayout();
        Ok(id)
    }

    /// Replace the payload of entry `id`; the length may change.
    pub fn replace_payload(&mut self, id: u64, data: Vec<u8>) -> Result<()> {
        if self.header_only {
            return Err(Error::Layout("cannot replace data in a header-only archive".into()));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::UnknownArchiveId(id))?;
        debug!(id, old = entry.size(), new = data.len(), "replacing archive entry");
        entry.data = Some(data);
        self.relayout();
        Ok(())
    }

    /// Compare header structure, ids, positions and end position, ignoring
    /// payloads.
    pub fn header_equals(&self, other: &Archive) -> bool {
        self.version == other.version
            && self.position_width == other.position_width
            && self.id_width == other.id_width
            && self.reserved == other.reserved
            && self.align == other.align
            && self.key == other.key
            && self.end_position == other.end_position
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.id == b.id && a.position == b.position)
    }

    /// Make this archive a header-only summary of `other`.
    pub fn sync_header_from(&mut self, other: &Archive) {
        self.version = other.version;
        self.position_width = other.position_width;
        self.id_width = other.id_width;
        self.reserved = other.reserved;
        self.align = other.align;
        self.key = other.key;
        self.entries = other
            .entries
            .iter()
            .map(|e| Entry::new(e.id, e.position, e.offset, e.end, None))
            .collect();
        self.end_position = other.end_position;
        self.header_only = true;
        self.tail_padding = 0;
    }
}
