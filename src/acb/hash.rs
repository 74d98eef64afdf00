//! Companion archive integrity: the stored MD5 and the header-only summary.
//!
//! Depending on the sheet version both fields either hold the value
//! directly or wrap it in a one-row table (`Hash` / `Header` column).

use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::afs2::Archive;
use crate::utf::{Blob, Value};
use crate::util::{Error, Result};

use super::CueSheet;

pub const STREAM_HASH_FIELD: &str = "StreamAwbHash";
pub const STREAM_HEADER_FIELD: &str = "StreamAwbAfs2Header";

/// Outcome of the content hash check made on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HashStatus {
    /// No companion archive, or checking was disabled.
    #[default]
    NotChecked,
    /// The sheet stores no hash.
    Missing,
    Match,
    /// Stored hash is stale. Common in sheets written by third-party tools.
    Mismatch { stored: [u8; 16], computed: [u8; 16] },
}

/// MD5 of serialized archive bytes.
pub fn content_hash(bytes: &[u8]) -> [u8; 16] {
    Md5::digest(bytes).into()
}

impl CueSheet {
    /// The stored companion archive hash.
    pub fn stored_stream_hash(&self) -> Result<Option<[u8; 16]>> {
        let header = self.header();
        if !header.has_field(STREAM_HASH_FIELD) {
            return Ok(None);
        }
        let Some(blob) = header.blob(0, STREAM_HASH_FIELD)? else {
            return Ok(None);
        };
        let bytes = match blob.table() {
            Some(wrapper) => wrapper.blob(0, "Hash")?.and_then(Blob::bytes),
            None => blob.bytes(),
        };
        match bytes {
            None => Ok(None),
            Some(b) => b
                .try_into()
                .map(Some)
                .map_err(|_| Error::format(format!("stream hash is {} bytes, expected 16", b.len()))),
        }
    }

    /// Compare the stored hash with `bytes`, logging a mismatch.
    pub fn verify_stream_hash(&self, bytes: &[u8]) -> Result<HashStatus> {
        let Some(stored) = self.stored_stream_hash()? else {
            debug!("cue sheet stores no stream hash");
            return Ok(HashStatus::Missing);
        };
        let computed = content_hash(bytes);
        if stored == computed {
            Ok(HashStatus::Match)
        } else {
            warn!(
                stored = %hex(&stored),
                computed = %hex(&computed),
                "stream archive hash does not match the cue sheet"
            );
            Ok(HashStatus::Mismatch { stored, computed })
        }
    }

    /// Recompute and store the hash of the serialized companion archive.
    ///
    /// Fails with [`Error::HashMismatch`] if the stored value does not read
    /// back equal to the fresh digest.
    pub fn refresh_hash(&mut self) -> Result<()> {
        let Some(stream) = self.stream_archive() else {
            return Ok(());
        };
        let digest = content_hash(&stream.to_bytes()?);
        if !self.header().has_field(STREAM_HASH_FIELD) {
            debug!("cue sheet has no stream hash field, skipping refresh");
            return Ok(());
        }
        let blob = self.header_mut().blob_mut(0, STREAM_HASH_FIELD)?;
        match blob.table_mut() {
            Some(wrapper) => wrapper.set(0, "Hash", Value::bytes(digest.to_vec()))?,
            None => *blob = Blob::from_bytes(digest.to_vec()),
        }
        if self.stored_stream_hash()? != Some(digest) {
            return Err(Error::HashMismatch);
        }
        debug!(hash = %hex(&digest), "refreshed stream hash");
        self.set_hash_status(HashStatus::Match);
        Ok(())
    }

    /// Header-only copy of the companion archive kept in the sheet.
    pub fn stream_header_summary(&self) -> Option<&Archive> {
        let header = self.header();
        if !header.has_field(STREAM_HEADER_FIELD) {
            return None;
        }
        let blob = header.blob(0, STREAM_HEADER_FIELD).ok().flatten()?;
        match blob.table() {
            Some(wrapper) => wrapper.archive(0, "Header").ok().flatten(),
            None => blob.archive(),
        }
    }

    fn stream_header_summary_mut(&mut self) -> Result<Option<&mut Archive>> {
        if !self.header().has_field(STREAM_HEADER_FIELD) {
            return Ok(None);
        }
        let blob = self.header_mut().blob_mut(0, STREAM_HEADER_FIELD)?;
        if blob.archive().is_some() {
            return Ok(blob.archive_mut());
        }
        match blob.table_mut() {
            Some(wrapper) => wrapper.archive_mut(0, "Header"),
            None => Ok(None),
        }
    }

    /// Whether the summary matches the companion archive; `None` when either
    /// is missing. A mismatch is logged.
    pub fn check_stream_header(&self) -> Option<bool> {
        let summary = self.stream_header_summary()?;
        let stream = self.stream_archive()?;
        let equal = summary.header_equals(stream);
        if !equal {
            warn!(
                summary_entries = summary.len(),
                stream_entries = stream.len(),
                "embedded stream archive header does not match the companion archive"
            );
        }
        Some(equal)
    }

    /// Copy the companion archive's index into the summary.
    pub fn sync_stream_header(&mut self) -> Result<()> {
        let Some(stream) = self.stream_archive().cloned() else {
            return Ok(());
        };
        match self.stream_header_summary_mut()? {
            Some(summary) => {
                summary.sync_header_from(&stream);
                debug!(entries = stream.len(), "synced stream archive header");
            }
            None => debug!("cue sheet has no stream header summary"),
        }
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        assert_eq!(hex(&content_hash(b"")), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex(&content_hash(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
    }
}
