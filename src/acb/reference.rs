//! Typed references between cue graph tables.

use std::fmt;

use crate::util::{Error, Result};

/// Row index sentinel for 16-bit index fields.
pub const NO_INDEX: u16 = 0xFFFF;

/// Sentinel for 32-bit id fields.
pub const NO_ID: u32 = 0xFFFF_FFFF;

/// Kind of table a [`Reference`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReferenceKind {
    Null = 0,
    Waveform = 1,
    Synth = 2,
    Sequence = 3,
    Track = 4,
    LinkedCue = 5,
    LinkedSynth = 6,
    LinkedSequence = 7,
    BlockSequence = 8,
    LinkedBlockSequence = 9,
}

impl ReferenceKind {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => Self::Null,
            1 => Self::Waveform,
            2 => Self::Synth,
            3 => Self::Sequence,
            4 => Self::Track,
            5 => Self::LinkedCue,
            6 => Self::LinkedSynth,
            7 => Self::LinkedSequence,
            8 => Self::BlockSequence,
            9 => Self::LinkedBlockSequence,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Waveform => "Waveform",
            Self::Synth => "Synth",
            Self::Sequence => "Sequence",
            Self::Track => "Track",
            Self::LinkedCue => "LinkedCue",
            Self::LinkedSynth => "LinkedSynth",
            Self::LinkedSequence => "LinkedSequence",
            Self::BlockSequence => "BlockSequence",
            Self::LinkedBlockSequence => "LinkedBlockSequence",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A (kind, row) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub index: u16,
}

impl Reference {
    pub const fn new(kind: ReferenceKind, index: u16) -> Self {
        Self { kind, index }
    }

    /// Build from raw type and index values as stored in tables and commands.
    pub fn from_raw(kind: u64, index: u64) -> Result<Self> {
        let k = u16::try_from(kind)
            .ok()
            .and_then(ReferenceKind::from_u16)
            .ok_or_else(|| Error::format(format!("unknown reference type {}", kind)))?;
        let index = u16::try_from(index)
            .map_err(|_| Error::format(format!("reference index {} out of range", index)))?;
        Ok(Self::new(k, index))
    }

    /// Reference to a row given as `usize`, failing when it does not fit
    /// the 16-bit index.
    pub fn to_row(kind: ReferenceKind, row: usize) -> Result<Self> {
        let index = u16::try_from(row)
            .ok()
            .filter(|&i| i != NO_INDEX)
            .ok_or_else(|| Error::Layout(format!("{} row {} does not fit a 16-bit index", kind, row)))?;
        Ok(Self::new(kind, index))
    }

    #[inline]
    pub fn row(&self) -> usize {
        self.index as usize
    }

    /// Big-endian type then index.
    pub fn to_bytes(&self) -> [u8; 4] {
        let [k0, k1] = self.kind.as_u16().to_be_bytes();
        let [i0, i1] = self.index.to_be_bytes();
        [k0, k1, i0, i1]
    }

    /// Decode a packed list of 4-byte reference items.
    pub fn decode_items(bytes: &[u8]) -> Result<Vec<Reference>> {
        if bytes.len() % 4 != 0 {
            return Err(Error::format(format!(
                "reference item list of {} bytes is not a multiple of 4",
                bytes.len()
            )));
        }
        bytes
            .chunks_exact(4)
            .map(|c| {
                Self::from_raw(
                    u16::from_be_bytes([c[0], c[1]]) as u64,
                    u16::from_be_bytes([c[2], c[3]]) as u64,
                )
            })
            .collect()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// Play mode of a sequence row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceType {
    Polyphonic = 0,
    Sequential = 1,
    Shuffle = 2,
    Random = 3,
    RandomNoRepeat = 4,
    SwitchGameVariable = 5,
    ComboSequential = 6,
    SwitchSelector = 7,
    TrackTransition = 8,
}

impl SequenceType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Polyphonic,
            1 => Self::Sequential,
            2 => Self::Shuffle,
            3 => Self::Random,
            4 => Self::RandomNoRepeat,
            5 => Self::SwitchGameVariable,
            6 => Self::ComboSequential,
            7 => Self::SwitchSelector,
            8 => Self::TrackTransition,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Polyphonic => "Polyphonic",
            Self::Sequential => "Sequential",
            Self::Shuffle => "Shuffle",
            Self::Random => "Random",
            Self::RandomNoRepeat => "RandomNoRepeat",
            Self::SwitchGameVariable => "SwitchGameVariable",
            Self::ComboSequential => "ComboSequential",
            Self::SwitchSelector => "SwitchSelector",
            Self::TrackTransition => "TrackTransition",
        }
    }
}
