//! ADX header probing and key-code frame scrambling.

use byteorder::BigEndian;

use crate::util::{ByteReader, Error, Result};

use super::{AudioCodec, AudioInfo, LoopPoints};

/// First two bytes of every ADX stream.
pub const ADX_MAGIC: u16 = 0x8000;

/// Revision byte value for key-code encryption.
pub const ADX_KEYCODE_REVISION: u8 = 9;

const REVISION_OFFSET: usize = 19;

/// Parsed ADX header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AdxHeader {
    /// Size of the header after the first four bytes.
    pub header_size: u16,
    pub encoding: u8,
    pub frame_size: u8,
    pub bit_depth: u8,
    pub channel_count: u8,
    pub sample_rate: u32,
    pub sample_count: u32,
    pub highpass_freq: u16,
    pub version: u8,
    pub revision: u8,
    pub loop_count: u16,
    pub loop_points: Option<LoopPoints>,
}

impl AdxHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(Error::codec(format!("ADX header needs 16 bytes, got {}", data.len())));
        }
        let mut r = ByteReader::<BigEndian>::new(data);
        let magic = r.u16()?;
        if magic != ADX_MAGIC {
            return Err(Error::codec(format!("bad ADX magic {:#06x}", magic)));
        }
        let mut h = AdxHeader {
            header_size: r.u16()?,
            encoding: r.u8()?,
            frame_size: r.u8()?,
            bit_depth: r.u8()?,
            channel_count: r.u8()?,
            sample_rate: r.u32()?,
            sample_count: r.u32()?,
            ..Default::default()
        };
        if h.channel_count == 0 || h.frame_size <= 2 {
            return Err(Error::codec("ADX header declares no channels or empty frames"));
        }
        if data.len() < 20 {
            return Ok(h);
        }
        h.highpass_freq = r.u16()?;
        h.version = r.u8()?;
        h.revision = r.u8()?;

        let mut pos = 20usize;
        if h.version == 4 {
            // History samples, with one extra padding word for mono.
            pos += 4 + 4 * h.channel_count as usize;
            if h.channel_count == 1 {
                pos += 4;
            }
        }
        if h.version != 5 && pos + 24 <= h.header_size as usize {
            r.seek(pos)?;
            let _inserted = r.u16()?;
            h.loop_count = r.u16()?;
            if h.loop_count > 0 {
                let _loop_type = r.u32()?;
                let start = r.u32()?;
                let _start_byte = r.u32()?;
                let end = r.u32()?;
                h.loop_points = Some(LoopPoints { start, end });
            }
        }
        Ok(h)
    }

    #[inline]
    pub fn samples_per_frame(&self) -> u32 {
        (self.frame_size as u32 - 2) * 2
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.sample_count.div_ceil(self.samples_per_frame())
    }

    /// Offset of the first audio frame.
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.header_size as usize + 4
    }
}

/// Scramble constants derived from a key code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdxKey {
    pub seed: u16,
    pub mult: u16,
    pub inc: u16,
}

impl AdxKey {
    pub fn from_keycode(keycode: u64) -> Self {
        let k = keycode.wrapping_sub(1);
        Self {
            seed: ((k >> 27) & 0x7FFF) as u16,
            mult: (((k >> 12) & 0x7FFC) | 1) as u16,
            inc: (((k << 1) & 0x7FFF) | 1) as u16,
        }
    }
}

/// XOR the first two bytes of every frame with the key stream.
fn scramble(data: &mut [u8], header: &AdxHeader, key: AdxKey, revision: u8) -> Result<()> {
    let frames = header.frame_count() as usize * header.channel_count as usize;
    let frame_size = header.frame_size as usize;
    let start = header.data_offset();
    let needed = start + frames.saturating_sub(1) * frame_size + 2;
    if frames > 0 && data.len() < needed {
        return Err(Error::codec(format!("ADX data truncated: need {} bytes, got {}", needed, data.len())));
    }
    let mut xor = key.seed as u32;
    for i in 0..frames {
        let pos = start + i * frame_size;
        data[pos] ^= (xor >> 8) as u8;
        if revision == ADX_KEYCODE_REVISION {
            data[pos] &= 0x1F;
        }
        data[pos + 1] ^= xor as u8;
        xor = (xor * key.mult as u32 + key.inc as u32) & 0x7FFF;
    }
    Ok(())
}

/// ADX codec: header probe plus key-code encryption.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdxCodec;

impl AudioCodec for AdxCodec {
    fn name(&self) -> &'static str {
        "ADX"
    }

    fn probe(&self, data: &[u8]) -> Result<AudioInfo> {
        let h = AdxHeader::parse(data)?;
        Ok(AudioInfo {
            channel_count: h.channel_count as u32,
            sample_rate: h.sample_rate,
            sample_count: h.sample_count,
            loop_count: h.loop_count as u32,
            loop_points: h.loop_points,
        })
    }

    fn encrypt(&self, data: &[u8], key: u64) -> Result<Vec<u8>> {
        let h = AdxHeader::parse(data)?;
        if data.len() < 20 || h.revision != 0 {
            return Err(Error::codec("ADX payload is already encrypted or has no revision byte"));
        }
        let mut out = data.to_vec();
        out[REVISION_OFFSET] = ADX_KEYCODE_REVISION;
        scramble(&mut out, &h, AdxKey::from_keycode(key), ADX_KEYCODE_REVISION)?;
        Ok(out)
    }

    fn decrypt(&self, data: &[u8], key: u64) -> Result<Vec<u8>> {
        let h = AdxHeader::parse(data)?;
        if data.len() < 20 || h.revision == 0 {
            return Err(Error::codec("ADX payload is not encrypted"));
        }
        let mut out = data.to_vec();
        scramble(&mut out, &h, AdxKey::from_keycode(key), h.revision)?;
        out[REVISION_OFFSET] = 0;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono 24 kHz, 64 samples (2 frames), header size 0x1C, no loop.
    fn sample_adx() -> Vec<u8> {
        let mut d = vec![
            0x80, 0x00, 0x00, 0x1C, // magic, header size
            3, 18, 4, 1, // encoding, frame size, bit depth, channels
            0x00, 0x00, 0x5D, 0xC0, // 24000 Hz
            0x00, 0x00, 0x00, 0x40, // 64 samples
            0x01, 0xF4, 3, 0, // highpass 500, version 3, revision 0
        ];
        d.resize(0x1C + 4, 0);
        for frame in 0..2u8 {
            let mut f = vec![0x10 + frame, 0x20 + frame];
            f.extend((0..16).map(|i| i * 3 + frame));
            d.extend(f);
        }
        d
    }

    #[test]
    fn test_probe_minimal() {
        let data = [0x80, 0x00, 0x00, 0x1C, 3, 18, 4, 1, 0, 0, 0x5D, 0xC0, 0, 0, 0, 0x20, 0xAA];
        let info = AdxCodec.probe(&data).unwrap();
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.sample_rate, 24000);
        assert_eq!(info.sample_count, 32);
        assert_eq!(info.loop_points, None);
        assert_eq!(info.duration_ms(), 1);
    }

    #[test]
    fn test_probe_loop() {
        let mut d = vec![
            0x80, 0x00, 0x00, 0x3C, 3, 18, 4, 2, 0x00, 0x00, 0xAC, 0x44, 0x00, 0x01, 0x00, 0x00,
            0x01, 0xF4, 4, 0,
        ];
        // version 4 stereo history: 4 + 8 bytes
        d.extend([0u8; 12]);
        d.extend([0, 0, 0, 1]); // inserted, loop count
        d.extend(0u32.to_be_bytes());
        d.extend(100u32.to_be_bytes());
        d.extend(0u32.to_be_bytes());
        d.extend(5000u32.to_be_bytes());
        d.extend(0u32.to_be_bytes());
        d.resize(0x3C + 4, 0);
        let info = AdxCodec.probe(&d).unwrap();
        assert_eq!(info.channel_count, 2);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.loop_count, 1);
        assert_eq!(info.loop_points, Some(LoopPoints { start: 100, end: 5000 }));
    }

    #[test]
    fn test_probe_rejects() {
        assert!(AdxCodec.probe(&[0x80, 0x00]).is_err());
        let mut d = sample_adx();
        d[0] = 0x81;
        assert!(matches!(AdxCodec.probe(&d), Err(Error::Codec(_))));
    }

    #[test]
    fn test_key_constants() {
        let k = AdxKey::from_keycode(1);
        assert_eq!(k, AdxKey { seed: 0, mult: 1, inc: 1 });
    }

    #[test]
    fn test_crypt_roundtrip() {
        let plain = sample_adx();
        let key = 0x0123_4567_89AB;
        let enc = AdxCodec.encrypt(&plain, key).unwrap();
        assert_eq!(enc[REVISION_OFFSET], ADX_KEYCODE_REVISION);
        assert_ne!(enc, plain);
        let dec = AdxCodec.decrypt(&enc, key).unwrap();
        assert_eq!(dec, plain);
        assert!(AdxCodec.decrypt(&plain, key).is_err());
    }
}
