//! Writing waveform payloads to files.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec::{AdxHeader, EncodeType};
use crate::util::Result;

use super::{CueSheet, TableKind, Visit, Visitor, WaveformNode};

/// How [`CueSheet::extract`] names and transforms payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractOptions {
    /// Walk cues instead of waveform rows. A waveform played by several
    /// cues is written once per cue.
    pub name_by_cue: bool,
    /// ADX key code; encrypted ADX payloads are decrypted when set.
    pub key_code: Option<u64>,
}

/// Characters that cannot appear in a file name component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

impl CueSheet {
    /// Write every available payload into `dir` and return the written paths.
    ///
    /// Rows whose archive is not loaded are skipped with a warning.
    pub fn extract(&self, dir: impl AsRef<Path>, options: &ExtractOptions) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut writer = PayloadWriter { sheet: self, dir, key_code: options.key_code, written: Vec::new(), cue: None };

        if options.name_by_cue {
            let ids: Vec<u64> = self.cue_ids().collect();
            for id in ids {
                let name = self.cue_name(id)?.unwrap_or_default();
                writer.cue = Some((id, sanitize(&name)));
                self.walk_cue(id, &mut writer)?;
            }
        } else {
            for row in 0..self.table(TableKind::Waveform)?.row_count() {
                let node = self.waveform_node(row)?;
                writer.write(&node, None)?;
            }
        }
        info!(dir = %dir.display(), files = writer.written.len(), "extracted waveforms");
        Ok(writer.written)
    }

    /// Decrypt an encrypted ADX payload; anything else passes through.
    pub fn decrypt_payload<'a>(&self, encode_type: EncodeType, payload: &'a [u8], key_code: u64) -> Result<Cow<'a, [u8]>> {
        if encode_type != EncodeType::ADX && encode_type != EncodeType::ADX2 {
            return Ok(Cow::Borrowed(payload));
        }
        if AdxHeader::parse(payload)?.revision == 0 {
            return Ok(Cow::Borrowed(payload));
        }
        Ok(Cow::Owned(self.codecs().get(encode_type)?.decrypt(payload, key_code)?))
    }
}

struct PayloadWriter<'s> {
    sheet: &'s CueSheet,
    dir: &'s Path,
    key_code: Option<u64>,
    written: Vec<PathBuf>,
    /// Cue being walked: id and sanitized name.
    cue: Option<(u64, String)>,
}

impl PayloadWriter<'_> {
    fn write(&mut self, node: &WaveformNode<'_>, at: Option<&Visit>) -> Result<()> {
        let Some(payload) = node.payload else {
            warn!(row = node.row, awb_id = node.awb_id, streaming = node.streaming, "payload not loaded, skipping");
            return Ok(());
        };
        let ext = node.encode_type.extension();
        let file = match (&self.cue, at) {
            (Some((id, name)), Some(at)) => format!("{}.{}{}.{}", id, name, at.path_suffix(), ext),
            _ => {
                let source = if node.streaming { "stream" } else { "memory" };
                format!("{}-{}.{}", source, node.awb_id, ext)
            }
        };
        let bytes = match self.key_code {
            Some(key) => self.sheet.decrypt_payload(node.encode_type, payload, key)?,
            None => Cow::Borrowed(payload),
        };
        let path = self.dir.join(file);
        fs::write(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote payload");
        self.written.push(path);
        Ok(())
    }
}

impl Visitor for PayloadWriter<'_> {
    fn waveform(&mut self, at: &Visit, node: &WaveformNode<'_>) -> Result<()> {
        self.write(node, Some(at))
    }
}
