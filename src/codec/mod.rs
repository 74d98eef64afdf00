//! Audio payload codecs.
//!
//! The cue sheet never interprets waveform payloads itself. A waveform row
//! names an encoding tag, and the [`CodecRegistry`] routes the bytes to an
//! [`AudioCodec`] for metadata probing and, where supported, key-based
//! encryption.

mod adx;
mod hca;

pub use adx::*;
pub use hca::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::util::{Error, Result};

/// Loop region in samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopPoints {
    pub start: u32,
    pub end: u32,
}

/// Metadata a codec reports for a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AudioInfo {
    pub channel_count: u32,
    pub sample_rate: u32,
    pub sample_count: u32,
    pub loop_count: u32,
    pub loop_points: Option<LoopPoints>,
}

impl AudioInfo {
    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count as u64 * 1000 / self.sample_rate as u64) as u32
    }
}

/// Encoding tag stored in a waveform row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodeType(pub u8);

impl EncodeType {
    pub const ADX: Self = Self(0);
    pub const AHX: Self = Self(1);
    pub const HCA: Self = Self(2);
    pub const ADX2: Self = Self(3);
    pub const WII_ADPCM: Self = Self(4);
    pub const DS_ADPCM: Self = Self(5);
    pub const HCA_MX: Self = Self(6);
    pub const VAG: Self = Self(7);
    pub const AT3: Self = Self(8);
    pub const BCWAV: Self = Self(9);
    pub const VAG2: Self = Self(10);
    pub const AT9: Self = Self(11);
    pub const XMA: Self = Self(12);
    pub const DSP: Self = Self(13);
    pub const AT9_2: Self = Self(18);
    pub const M4A: Self = Self(19);
    pub const OGG: Self = Self(24);

    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "ADX",
            1 => "AHX",
            2 => "HCA",
            3 => "ADX2",
            4 => "WIIADPCM",
            5 => "DSADPCM",
            6 => "HCAMX",
            7 => "VAG",
            8 => "AT3",
            9 => "BCWAV",
            10 => "VAG2",
            11 => "AT9",
            12 => "XMA",
            13 => "DSP",
            18 => "AT92",
            19 => "M4A",
            24 => "OGG",
            _ => return None,
        })
    }

    /// File extension for extracted payloads, lower case, without a dot.
    pub fn extension(self) -> &'static str {
        match self.0 {
            0 | 3 => "adx",
            1 => "ahx",
            2 => "hca",
            4 => "wiiadpcm",
            5 => "dsadpcm",
            6 => "hcamx",
            7 | 10 => "vag",
            8 => "at3",
            9 => "bcwav",
            11 | 18 => "at9",
            12 => "xma",
            13 => "dsp",
            19 => "m4a",
            24 => "ogg",
            _ => "bin",
        }
    }
}

impl fmt::Display for EncodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "encoding {}", self.0),
        }
    }
}

/// A payload codec.
///
/// Only `probe` is required; the other operations report
/// [`Error::UnsupportedEncoding`] unless a codec provides them.
pub trait AudioCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read channel count, rate, length and loop points from the payload header.
    fn probe(&self, data: &[u8]) -> Result<AudioInfo>;

    fn decode(&self, _data: &[u8]) -> Result<Vec<i16>> {
        Err(Error::UnsupportedEncoding(format!("{} decoding", self.name())))
    }

    fn encrypt(&self, _data: &[u8], _key: u64) -> Result<Vec<u8>> {
        Err(Error::UnsupportedEncoding(format!("{} encryption", self.name())))
    }

    fn decrypt(&self, _data: &[u8], _key: u64) -> Result<Vec<u8>> {
        Err(Error::UnsupportedEncoding(format!("{} decryption", self.name())))
    }
}

/// Encoding tag to codec lookup.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<EncodeType, Arc<dyn AudioCodec>>,
}

impl Default for CodecRegistry {
    /// ADX (tags 0 and 3) and HCA (tags 2 and 6).
    fn default() -> Self {
        let mut reg = Self::empty();
        let adx: Arc<dyn AudioCodec> = Arc::new(AdxCodec);
        let hca: Arc<dyn AudioCodec> = Arc::new(HcaCodec);
        reg.register(EncodeType::ADX, adx.clone());
        reg.register(EncodeType::ADX2, adx);
        reg.register(EncodeType::HCA, hca.clone());
        reg.register(EncodeType::HCA_MX, hca);
        reg
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.codecs.keys().map(|t| t.0).collect();
        tags.sort_unstable();
        f.debug_struct("CodecRegistry").field("tags", &tags).finish()
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self { codecs: HashMap::new() }
    }

    pub fn register(&mut self, tag: EncodeType, codec: Arc<dyn AudioCodec>) {
        self.codecs.insert(tag, codec);
    }

    pub fn get(&self, tag: EncodeType) -> Result<&dyn AudioCodec> {
        self.codecs
            .get(&tag)
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::UnsupportedEncoding(tag.to_string()))
    }

    pub fn probe(&self, tag: EncodeType, data: &[u8]) -> Result<AudioInfo> {
        self.get(tag)?.probe(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let info = AudioInfo { sample_rate: 48000, sample_count: 72000, ..Default::default() };
        assert_eq!(info.duration_ms(), 1500);
        assert_eq!(AudioInfo::default().duration_ms(), 0);
    }

    #[test]
    fn test_encode_type_names() {
        assert_eq!(EncodeType::HCA.extension(), "hca");
        assert_eq!(EncodeType::ADX2.extension(), "adx");
        assert_eq!(EncodeType(99).extension(), "bin");
        assert_eq!(EncodeType(99).to_string(), "encoding 99");
        assert_eq!(EncodeType::AT9_2.to_string(), "AT92");
    }

    #[test]
    fn test_registry_routing() {
        let reg = CodecRegistry::default();
        assert_eq!(reg.get(EncodeType::ADX2).unwrap().name(), "ADX");
        assert_eq!(reg.get(EncodeType::HCA_MX).unwrap().name(), "HCA");
        assert!(matches!(reg.get(EncodeType::VAG), Err(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_default_operations_unsupported() {
        let reg = CodecRegistry::default();
        let hca = reg.get(EncodeType::HCA).unwrap();
        assert!(matches!(hca.decode(&[]), Err(Error::UnsupportedEncoding(_))));
        assert!(matches!(hca.encrypt(&[], 1), Err(Error::UnsupportedEncoding(_))));
    }
}
