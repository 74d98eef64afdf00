//! AFS2 parsing.

use byteorder::LittleEndian;
use tracing::trace;

use crate::util::{check_zero, checked_align_up, ByteReader, Error, Result};

use super::{header_size, is_valid_width, Archive, Entry, AFS2_ALIGN, AFS2_MAGIC};

/// Parsed header fields before entries are attached.
struct Header {
    version: u8,
    position_width: u8,
    id_width: u8,
    reserved: u8,
    align: u16,
    key: u16,
    ids: Vec<u64>,
    positions: Vec<u64>,
    end_position: u64,
}

fn read_header(data: &[u8]) -> Result<Header> {
    let mut r = ByteReader::<LittleEndian>::new(data);
    let magic = r.take(4)?;
    if magic != AFS2_MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(Error::InvalidMagic { expected: "AFS2", found });
    }
    let version = r.u8()?;
    let position_width = r.u8()?;
    let id_width = r.u8()?;
    let reserved = r.u8()?;
    let count = r.u32()? as usize;
    let align = r.u16()?;
    let key = r.u16()?;
    if align != AFS2_ALIGN {
        return Err(Error::format(format!("archive alignment {} (expected {})", align, AFS2_ALIGN)));
    }
    if !is_valid_width(position_width) || !is_valid_width(id_width) {
        return Err(Error::format(format!(
            "unsupported field widths: position {}, id {}",
            position_width, id_width
        )));
    }
    // Every entry needs at least an id and a position.
    if count > data.len() {
        return Err(Error::UnexpectedEof(count as u64));
    }
    let size = header_size(count, position_width, id_width);
    if size > data.len() {
        return Err(Error::UnexpectedEof(size as u64));
    }

    let ids = (0..count).map(|_| r.uint(id_width)).collect::<Result<Vec<_>>>()?;
    let positions = (0..count).map(|_| r.uint(position_width)).collect::<Result<Vec<_>>>()?;
    let end_position = r.uint(position_width)?;
    debug_assert_eq!(r.pos(), size);

    if let Some(&first) = positions.first() {
        if first != size as u64 {
            return Err(Error::OffsetMismatch { what: "first entry", stored: first, computed: size as u64 });
        }
    }
    if end_position < size as u64 {
        return Err(Error::OffsetMismatch { what: "end position", stored: end_position, computed: size as u64 });
    }
    let mut previous = size as u64;
    for &position in positions.iter().chain(std::iter::once(&end_position)) {
        if position < previous {
            return Err(Error::OffsetMismatch { what: "entry position", stored: position, computed: previous });
        }
        previous = position;
    }
    Ok(Header { version, position_width, id_width, reserved, align, key, ids, positions, end_position })
}

impl Header {
    /// End of entry `i`: the next position, or the end position.
    fn end_of(&self, i: usize) -> u64 {
        self.positions.get(i + 1).copied().unwrap_or(self.end_position)
    }

    fn into_archive(self, entries: Vec<Entry>, header_only: bool) -> Archive {
        Archive {
            version: self.version,
            position_width: self.position_width,
            id_width: self.id_width,
            reserved: self.reserved,
            align: self.align,
            key: self.key,
            entries,
            end_position: self.end_position,
            header_only,
            tail_padding: 0,
        }
    }

    fn entries(&self, data: Option<&[u8]>) -> Result<Vec<Entry>> {
        let align = self.align as u64;
        let mut entries = Vec::with_capacity(self.ids.len());
        for (i, (&id, &position)) in self.ids.iter().zip(&self.positions).enumerate() {
            let end = self.end_of(i);
            let offset = checked_align_up(position, align)
                .filter(|&offset| offset <= end)
                .ok_or(Error::OffsetMismatch { what: "entry end", stored: end, computed: position })?;
            let payload = match data {
                Some(data) => {
                    check_zero(&data[position as usize..offset as usize], position)?;
                    Some(data[offset as usize..end as usize].to_vec())
                }
                None => None,
            };
            entries.push(Entry::new(id, position, offset, end, payload));
        }
        Ok(entries)
    }
}

impl Archive {
    /// Parse an archive at the start of `data`, returning the bytes used.
    ///
    /// The archive is full when `data` reaches the declared end position,
    /// header-only otherwise.
    pub fn parse_prefix(data: &[u8]) -> Result<(Archive, usize)> {
        let header = read_header(data)?;
        let size = header_size(header.ids.len(), header.position_width, header.id_width);
        if (data.len() as u64) < header.end_position {
            let entries = header.entries(None)?;
            trace!(entries = entries.len(), "parsed header-only archive");
            return Ok((header.into_archive(entries, true), size));
        }
        let end = header.end_position as usize;
        let entries = header.entries(Some(&data[..end]))?;
        trace!(entries = entries.len(), end, "parsed archive");
        Ok((header.into_archive(entries, false), end))
    }

    /// Parse a standalone archive file. Bytes after the end position must
    /// be zero and are kept as tail padding.
    pub fn parse(data: &[u8]) -> Result<Archive> {
        let (mut archive, used) = Self::parse_prefix(data)?;
        if archive.header_only {
            if data.len() > used {
                return Err(Error::UnexpectedEof(archive.end_position));
            }
            return Ok(archive);
        }
        check_zero(&data[used..], used as u64)?;
        archive.tail_padding = u32::try_from(data.len() - used)
            .map_err(|_| Error::format("archive tail padding too large"))?;
        Ok(archive)
    }

    /// Parse only the header, ignoring any payload bytes.
    pub fn parse_header(data: &[u8]) -> Result<Archive> {
        let header = read_header(data)?;
        let entries = header.entries(None)?;
        Ok(header.into_archive(entries, true))
    }
}
