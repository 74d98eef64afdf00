//! AFS2 serialization.

use byteorder::LittleEndian;

use crate::util::{ByteWriter, Error, Result};

use super::{Archive, AFS2_MAGIC};

impl Archive {
    /// Serialize the archive: header, then (for a full archive) every entry
    /// at its aligned offset, then any tail padding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header_size = self.header_size() as u64;
        let mut prev = header_size;
        for e in &self.entries {
            if e.position() < prev || e.offset() < e.position() || e.end() < e.offset() {
                return Err(Error::Layout(format!("entry {} is out of position order", e.id())));
            }
            prev = e.end();
        }
        if self.end_position < prev {
            return Err(Error::Layout("end position precedes last entry".into()));
        }
        let count = u32::try_from(self.entries.len())
            .map_err(|_| Error::Layout("too many entries".into()))?;

        let capacity = if self.header_only { header_size } else { self.end_position };
        let mut w = ByteWriter::<LittleEndian>::with_capacity(capacity as usize + self.tail_padding as usize);
        w.bytes(AFS2_MAGIC);
        w.u8(self.version);
        w.u8(self.position_width);
        w.u8(self.id_width);
        w.u8(self.reserved);
        w.u32(count);
        w.u16(self.align);
        w.u16(self.key);
        for e in &self.entries {
            w.uint(self.id_width, e.id())?;
        }
        for e in &self.entries {
            w.uint(self.position_width, e.position())?;
        }
        w.uint(self.position_width, self.end_position)?;

        if self.header_only {
            return Ok(w.into_inner());
        }
        for e in &self.entries {
            let data = e
                .data()
                .ok_or_else(|| Error::Layout(format!("entry {} has no payload", e.id())))?;
            if data.len() as u64 != e.size() {
                return Err(Error::Layout(format!("entry {} size is stale", e.id())));
            }
            w.zeros((e.offset() - w.pos() as u64) as usize);
            w.bytes(data);
        }
        w.zeros(self.end_position as usize - w.pos());
        w.zeros(self.tail_padding as usize);
        Ok(w.into_inner())
    }
}
