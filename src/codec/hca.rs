//! HCA header probing.

use byteorder::BigEndian;

use crate::util::{ByteReader, Error, Result};

use super::{AudioCodec, AudioInfo, LoopPoints};

/// HCA magic after masking off the high bit of each byte.
pub const HCA_MAGIC: &[u8; 4] = b"HCA\0";

/// Chunk tags may have their high bits set when the stream is keyed.
fn unmask(tag: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    for (o, b) in out.iter_mut().zip(tag) {
        *o = b & 0x7F;
    }
    out
}

/// HCA codec: reads the `fmt` and `loop` chunks of the header.
#[derive(Clone, Copy, Debug, Default)]
pub struct HcaCodec;

impl AudioCodec for HcaCodec {
    fn name(&self) -> &'static str {
        "HCA"
    }

    fn probe(&self, data: &[u8]) -> Result<AudioInfo> {
        let mut r = ByteReader::<BigEndian>::new(data);
        if unmask(r.take(4)?) != *HCA_MAGIC {
            return Err(Error::codec("bad HCA magic"));
        }
        let _version = r.u16()?;
        let header_size = r.u16()? as usize;

        let mut info: Option<AudioInfo> = None;
        let mut loop_points = None;
        while r.pos() + 4 <= header_size.min(data.len()) {
            let tag = unmask(r.take(4)?);
            match &tag {
                b"fmt\0" => {
                    let channels = r.u8()?;
                    let rate_hi = r.u8()? as u32;
                    let rate_lo = r.u16()? as u32;
                    let frames = r.u32()?;
                    let inserted = r.u16()? as u32;
                    let appended = r.u16()? as u32;
                    info = Some(AudioInfo {
                        channel_count: channels as u32,
                        sample_rate: (rate_hi << 16) | rate_lo,
                        sample_count: frames.saturating_mul(1024).saturating_sub(inserted + appended),
                        ..Default::default()
                    });
                }
                b"loop" => {
                    let start = r.u32()?;
                    let end = r.u32()?;
                    r.take(4)?;
                    loop_points = Some(LoopPoints { start, end });
                }
                b"comp" => {
                    r.take(12)?;
                }
                b"dec\0" => {
                    r.take(8)?;
                }
                b"ath\0" | b"ciph" => {
                    r.take(2)?;
                }
                b"rva\0" | b"vbr\0" => {
                    r.take(4)?;
                }
                b"comm" => {
                    r.take(1)?;
                    r.cstring()?;
                }
                _ => break,
            }
        }

        let mut info = info.ok_or_else(|| Error::codec("HCA header has no fmt chunk"))?;
        if let Some(lp) = loop_points {
            info.loop_count = 1;
            info.loop_points = Some(lp);
        }
        Ok(info)
    }
}
