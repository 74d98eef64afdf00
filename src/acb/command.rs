//! Command stream bytecode.
//!
//! Synth, sequence and track rows carry parameter streams, and track event
//! rows carry the note stream that links a track to its children. All use
//! the same encoding, consumed left to right until the bytes run out:
//!
//! ```text
//! opcode: u16 BE | count: u8 | params: [u8; count]
//! ```

use std::fmt;

use smallvec::SmallVec;

use crate::util::{Error, Result};

use super::Reference;

/// Size of the opcode and count prefix.
pub const COMMAND_HEADER_SIZE: usize = 3;

/// Opcodes with dedicated handling.
pub mod op {
    pub const NULL: u16 = 0;
    pub const PAN3D_INTERIOR_DISTANCE_GAIN: u16 = 14;
    pub const BIQUAD: u16 = 31;
    pub const BANDPASS: u16 = 32;
    pub const CATEGORY: u16 = 65;
    pub const POS3D_DISTANCE_MIN: u16 = 68;
    pub const POS3D_DISTANCE_MAX: u16 = 69;
    pub const GLOBAL_AISAC_REFERENCE: u16 = 75;
    pub const CUE_LIMITS_AND_MODE: u16 = 79;
    pub const VOLUME_GAIN_RES100: u16 = 87;
    pub const SELECTOR: u16 = 99;
    pub const TRACK_SELECTOR_LABEL: u16 = 100;
    pub const VOLUME_BUS: u16 = 111;
    pub const LOOP_END: u16 = 1200;
    pub const LOOP_START: u16 = 1201;
    pub const NOTE_ON: u16 = 2000;
    pub const DELAY: u16 = 2001;
    pub const SET_SYNTH_OR_WAVEFORM: u16 = 2002;
    pub const NOTE_ON_WITH_NO: u16 = 2003;
}

/// Loop count value for an endless loop.
pub const LOOP_INDEFINITE: u16 = 0xFFFF;

/// One decoded command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub opcode: u16,
    pub params: SmallVec<[u8; 8]>,
}

impl Command {
    pub fn new(opcode: u16, params: &[u8]) -> Self {
        Self { opcode, params: SmallVec::from_slice(params) }
    }

    /// NoteOn pointing at `target`.
    pub fn note_on(target: Reference) -> Self {
        Self::new(op::NOTE_ON, &target.to_bytes())
    }

    pub fn null() -> Self {
        Self::new(op::NULL, &[])
    }

    pub fn name(&self) -> Option<&'static str> {
        opcode_name(self.opcode)
    }

    /// Encoded length.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEADER_SIZE + self.params.len()
    }

    /// True for NoteOn-family commands that link to a child node.
    pub fn is_structural(&self) -> bool {
        matches!(self.opcode, op::NOTE_ON | op::NOTE_ON_WITH_NO)
    }

    /// Child reference of a NoteOn-family command.
    ///
    /// `None` for other opcodes; an error when the parameters do not hold
    /// a valid reference.
    pub fn note_target(&self) -> Option<Result<Reference>> {
        let sizes: &[usize] = match self.opcode {
            op::NOTE_ON => &[2, 2],
            op::NOTE_ON_WITH_NO => &[2, 2, 2],
            _ => return None,
        };
        let Some(args) = split_params(&self.params, sizes) else {
            return Some(Err(Error::format(format!(
                "{} with {} parameter bytes",
                opcode_label(self.opcode),
                self.params.len()
            ))));
        };
        Some(Reference::from_raw(args[0], args[1]))
    }

    /// Decode the parameters by opcode.
    ///
    /// Unknown opcodes and known ones with unexpected parameter sizes come
    /// back as [`CommandArgs::Raw`].
    pub fn args(&self) -> CommandArgs {
        let p = &self.params[..];
        let a = |sizes: &[usize]| split_params(p, sizes);
        let parsed = match self.opcode {
            op::NULL if p.is_empty() => Some(CommandArgs::Null),
            op::NOTE_ON => a(&[2, 2]).and_then(|v| {
                Reference::from_raw(v[0], v[1]).ok().map(|target| CommandArgs::NoteOn { target })
            }),
            op::NOTE_ON_WITH_NO => a(&[2, 2, 2]).and_then(|v| {
                Reference::from_raw(v[0], v[1])
                    .ok()
                    .map(|target| CommandArgs::NoteOnWithNo { target, number: v[2] as u16 })
            }),
            op::DELAY => a(&[4]).map(|v| CommandArgs::Delay { millis: v[0] as u32 }),
            op::LOOP_START => a(&[2, 2]).map(|v| CommandArgs::LoopStart {
                loop_id: v[0] as u16,
                count: v[1] as u16,
            }),
            op::LOOP_END => a(&[2, 2, 2]).map(|v| CommandArgs::LoopEnd {
                loop_id: v[0] as u16,
                a: v[1] as u16,
                b: v[2] as u16,
            }),
            op::VOLUME_BUS => a(&[2, 2]).map(|v| CommandArgs::VolumeBus {
                bus_name_index: v[0] as u16,
                volume: v[1] as u16,
            }),
            op::CATEGORY => match p.len() {
                4 => a(&[4]).map(|v| CommandArgs::Category { extra: None, category_id: v[0] as u32 }),
                8 => a(&[4, 4]).map(|v| CommandArgs::Category {
                    extra: Some(v[0] as u32),
                    category_id: v[1] as u32,
                }),
                _ => None,
            },
            op::GLOBAL_AISAC_REFERENCE => {
                a(&[2]).map(|v| CommandArgs::GlobalAisacReference { index: v[0] as u16 })
            }
            op::PAN3D_INTERIOR_DISTANCE_GAIN => {
                a(&[2]).map(|v| CommandArgs::Pan3dInteriorDistanceGain { value: v[0] as u16 })
            }
            op::POS3D_DISTANCE_MIN => float_param(p).map(CommandArgs::Pos3dDistanceMin),
            op::POS3D_DISTANCE_MAX => float_param(p).map(CommandArgs::Pos3dDistanceMax),
            op::CUE_LIMITS_AND_MODE => a(&[2, 2, 1]).map(|v| CommandArgs::CueLimitsAndMode {
                limit1: v[0] as u16,
                limit2: v[1] as u16,
                mode: v[2] as u8,
            }),
            op::VOLUME_GAIN_RES100 => a(&[2]).map(|v| CommandArgs::VolumeGainRes100 { gain: v[0] as u16 }),
            op::SELECTOR => a(&[2]).map(|v| CommandArgs::Selector { selector: v[0] as u16 }),
            op::TRACK_SELECTOR_LABEL => a(&[2, 2]).map(|v| CommandArgs::TrackSelectorLabel {
                selector: v[0] as u16,
                label: v[1] as u16,
            }),
            op::BIQUAD => a(&[1, 2, 2, 2]).map(|v| CommandArgs::Biquad {
                filter: v[0] as u8,
                a: v[1] as u16,
                b: v[2] as u16,
                c: v[3] as u16,
            }),
            op::BANDPASS => a(&[2, 2]).map(|v| CommandArgs::Bandpass { low: v[0] as u16, high: v[1] as u16 }),
            _ => None,
        };
        parsed.unwrap_or(CommandArgs::Raw)
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u8::try_from(self.params.len()).map_err(|_| {
            Error::Layout(format!(
                "{} has {} parameter bytes, at most 255 fit",
                opcode_label(self.opcode),
                self.params.len()
            ))
        })?;
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.push(count);
        out.extend_from_slice(&self.params);
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", opcode_label(self.opcode))?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        f.write_str(")")
    }
}

/// Semantic view of a command's parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandArgs {
    Null,
    NoteOn { target: Reference },
    /// The trailing number is not interpreted.
    NoteOnWithNo { target: Reference, number: u16 },
    Delay { millis: u32 },
    /// `count == LOOP_INDEFINITE` loops forever.
    LoopStart { loop_id: u16, count: u16 },
    LoopEnd { loop_id: u16, a: u16, b: u16 },
    /// Bus name is a row of the string value table; volume is in 1/10000.
    VolumeBus { bus_name_index: u16, volume: u16 },
    Category { extra: Option<u32>, category_id: u32 },
    GlobalAisacReference { index: u16 },
    Pan3dInteriorDistanceGain { value: u16 },
    Pos3dDistanceMin(f32),
    Pos3dDistanceMax(f32),
    CueLimitsAndMode { limit1: u16, limit2: u16, mode: u8 },
    VolumeGainRes100 { gain: u16 },
    Selector { selector: u16 },
    TrackSelectorLabel { selector: u16, label: u16 },
    Biquad { filter: u8, a: u16, b: u16, c: u16 },
    Bandpass { low: u16, high: u16 },
    /// Parameters kept as bytes.
    Raw,
}

/// Split `params` into big-endian unsigned values of the given widths.
///
/// `None` when the widths do not add up to the parameter length.
pub fn split_params(params: &[u8], sizes: &[usize]) -> Option<SmallVec<[u64; 4]>> {
    if sizes.iter().sum::<usize>() != params.len() {
        return None;
    }
    let mut out = SmallVec::new();
    let mut pos = 0;
    for &size in sizes {
        let v = params[pos..pos + size].iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        out.push(v);
        pos += size;
    }
    Some(out)
}

fn float_param(params: &[u8]) -> Option<f32> {
    let bytes: [u8; 4] = params.try_into().ok()?;
    Some(f32::from_be_bytes(bytes))
}

/// Decode a whole stream.
///
/// A single leftover byte is reported as [`Error::TrailingBytes`]; two
/// leftover bytes, or a parameter run cut short, as
/// [`Error::TruncatedCommand`].
pub fn decode_commands(bytes: &[u8]) -> Result<Vec<Command>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let available = bytes.len() - pos;
        if available == 1 {
            return Err(Error::TrailingBytes { offset: pos, count: 1 });
        }
        if available < COMMAND_HEADER_SIZE {
            return Err(Error::TruncatedCommand { offset: pos, needed: COMMAND_HEADER_SIZE, available });
        }
        let opcode = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
        let needed = COMMAND_HEADER_SIZE + bytes[pos + 2] as usize;
        if available < needed {
            return Err(Error::TruncatedCommand { offset: pos, needed, available });
        }
        out.push(Command::new(opcode, &bytes[pos + COMMAND_HEADER_SIZE..pos + needed]));
        pos += needed;
    }
    Ok(out)
}

pub fn encode_commands(commands: &[Command]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(commands.iter().map(Command::encoded_len).sum());
    for c in commands {
        c.encode_into(&mut out)?;
    }
    Ok(out)
}

/// Name for reports, falling back to the number.
pub fn opcode_label(opcode: u16) -> String {
    match opcode_name(opcode) {
        Some(name) => name.to_string(),
        None => format!("Opcode{}", opcode),
    }
}

/// Name of a known opcode.
pub fn opcode_name(opcode: u16) -> Option<&'static str> {
    const LOW: [&str; 125] = [
        "Null",
        "VolumeOffset",
        "VolumeGain_NoUse",
        "VolumeOffsetGain",
        "VolumeGainRandomRange_NoUse",
        "PitchOffset",
        "PitchGain",
        "PitchOffsetGain",
        "PitchOffsetRandomRange",
        "PreDelay",
        "PreDelayRandomRange",
        "Pan3dAngle",
        "Pan3dAngleRandomRange",
        "Pan3dInteriorDistanceOffset",
        "Pan3dInteriorDistanceGain",
        "Pan3dInteriorDistanceOffsetGain",
        "Pan3dVolume",
        "Pan3dLock",
        "CenterLfeSendGain_Synth",
        "CenterLfeSendGain_Waveform",
        "LRSendGain",
        "LsRsSendGain",
        "Ex1Ex2SendGain",
        "DrySendL",
        "DrySendR",
        "DrySendCenter",
        "DrySendLFE",
        "DrySendsL",
        "DrySendsR",
        "DrySendsEx1",
        "DrySendsEx2",
        "Biquad",
        "Bandpass",
        "Mute",
        "PriorityModeAndValue",
        "PriorityHoldtimeAndDelta",
        "VolumeEnvelopeAttackRateAndCurve",
        "VolumeEnvelopeDelayAndHold",
        "VolumeEnvelopeDecayRateAndCurve",
        "VolumeEnvelopeSustainLevel",
        "VolumeEnvelopeReleaseRateAndCurve",
        "VoiceLimitGroupAndMode",
        "GameVariableAndState",
        "Probability",
        "Bus0Send",
        "Bus1Send_Cue",
        "Bus1Send_Synth",
        "Bus2Send_Cue",
        "Bus2Send_Synth",
        "Bus3Send_Cue",
        "Bus3Send_Synth",
        "Bus4Send_Cue",
        "Bus4Send_Synth",
        "Bus5Send_Cue",
        "Bus5Send_Synth",
        "Bus6Send_Cue",
        "Bus6Send_Synth",
        "Bus7Send_Cue",
        "Bus7Send_Synth",
        "VolumeGainWithRandomRange_NoUse",
        "PitchOffsetWithRandomRange",
        "Pan3dAngleWithRandomRange",
        "Pan3dInteriorDistanceGainRandomRange",
        "Pan3dInteriorDistanceGainWithRandomRange",
        "BiquadWithRandomRange",
        "Category",
        "Pos3dVolume",
        "Pos3dInsideAndOutsideAngle",
        "Pos3dDistanceMin",
        "Pos3dDistanceMax",
        "PanType",
        "PreDelayWithRandomRange",
        "CuePriority",
        "CueLimits",
        "Pos3dDopplerCoefficient",
        "GlobalAisacReference",
        "MixdownCenterLfeSendGain_Synth_NoUse",
        "MixdownCenterLfeSendGain_Track_NoUse",
        "Pos3dListnerBaseAisacControlAngle",
        "CueLimitsAndMode",
        "CuePriorityModeAndValue",
        "CuePriorityMode",
        "SilentMode",
        "MixdownCenterSendGain_Synth",
        "MixdownCenterSendGain_Track",
        "MixdownLfeSendGain_Synth",
        "MixdownLfeSendGain_Track",
        "VolumeGain_Res100",
        "VolumeRandomization1",
        "VolumeRandomization2",
        "PlaybackRatio",
        "SwitchVariableId",
        "SwitchVariableName",
        "TrackMonoFlag",
        "ComboTimeAndLoopBack",
        "DeviceSend0",
        "DeviceSend1",
        "DeviceSend2",
        "BeatInfo",
        "Selector",
        "TrackSelectorLabel",
        "FadeTime4MusicTransition",
        "FadeTimeOffset4MusicTransition",
        "FadeCurveType4MusicTransition",
        "Dummy_2",
        "UsePlayerFader",
        "Dummy_1",
        "FrontBypass",
        "Pos3dSourceBaseAisacControlAngle",
        "OutputAsrRackId",
        "CuePlaybackMode",
        "VolumeBus",
        "Dummy_4",
        "BeatSyncInfos",
        "IgnorePlayerParameter",
        "TrackBpm4TrackTransition",
        "TransitionType4MusicTransition",
        "IgnoreLoop",
        "MultiplDiscreteAudioChannelsRouting",
        "TrackTransitionType4TrackTransition",
        "MultiplePlaybackProhibitionTime",
        "MaximumPitch",
        "FixedAngleZeroWithinMinDistance",
        "RendererType",
        "StopAtLoopEnd",
    ];
    if let Some(name) = LOW.get(opcode as usize) {
        return Some(name);
    }
    Some(match opcode {
        127 => "Unk127",
        128 => "Unk128",
        998 => "SequenceStartRandom",
        999 => "SequenceStart",
        1000 => "NoteOff",
        1001 => "NoteOnWithOff",
        1200 => "LoopEnd",
        1201 => "LoopStart",
        1250 => "SequenceCallback",
        1251 => "SequenceCallbackWithId",
        1252 => "SequenceCallbackWithString",
        1253 => "SequenceCallbackWithIdAndString",
        1989 => "AutoRepeatIntervalWithNum",
        1990 => "AutoRepeatInterval",
        1991 => "TimingRandom",
        2000 => "NoteOn",
        2001 => "Delay",
        2002 => "SetSynthOrWaveform",
        2003 => "NoteOnWithNo",
        2004 => "Unk2004",
        2005 => "Unk2005",
        3999 => "SequenceEndForReact",
        4000 => "SequenceEnd",
        4050 => "BlockEnd",
        4051 => "TransitionTrack",
        4052 => "FirstAfterTransitionTrack",
        7100 => "StartAction",
        7101 => "StopAction",
        7102 => "MuteTrackAction",
        7103 => "ChangePlaybackParameter",
        7104 => "SetSelectorLabel",
        7105 => "ChangePlaybackParameterFloatRatio",
        7106 => "FaderSetting",
        7107 => "ChangePlaybackParameterFloatRatioWithCurve",
        8000 => "StopHaptic",
        8001 => "StartHapticUhlEffect",
        8002 => "StartHapticEffectWithPriority",
        8003 => "StartTouchSenseEffect",
        8004 => "StartTouchSenseEffectWithPriority",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acb::ReferenceKind;

    fn sample_stream() -> Vec<u8> {
        encode_commands(&[
            Command::new(op::VOLUME_BUS, &[0, 1, 0x27, 0x10]),
            Command::note_on(Reference::new(ReferenceKind::Synth, 3)),
            Command::new(op::DELAY, &[0, 0, 1, 0]),
            Command::null(),
        ])
        .unwrap()
    }

    #[test]
    fn test_decode_in_order() {
        let cmds = decode_commands(&sample_stream()).unwrap();
        let ops: Vec<_> = cmds.iter().map(|c| c.opcode).collect();
        assert_eq!(ops, vec![op::VOLUME_BUS, op::NOTE_ON, op::DELAY, op::NULL]);
        assert_eq!(encode_commands(&cmds).unwrap(), sample_stream());
    }

    #[test]
    fn test_empty_stream() {
        assert!(decode_commands(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_header() {
        let mut s = sample_stream();
        let len = s.len();
        s.extend([0x07, 0xD0]);
        assert!(matches!(
            decode_commands(&s),
            Err(Error::TruncatedCommand { offset, needed: 3, available: 2 }) if offset == len
        ));
    }

    #[test]
    fn test_truncated_params() {
        assert!(matches!(
            decode_commands(&[0x07, 0xD0, 4, 0, 2]),
            Err(Error::TruncatedCommand { offset: 0, needed: 7, available: 5 })
        ));
    }

    #[test]
    fn test_trailing_byte() {
        let mut s = sample_stream();
        s.push(0);
        assert!(matches!(decode_commands(&s), Err(Error::TrailingBytes { count: 1, .. })));
    }

    #[test]
    fn test_unknown_opcode_is_raw() {
        let cmds = decode_commands(&[0x12, 0x34, 2, 9, 9]).unwrap();
        assert_eq!(cmds[0].opcode, 0x1234);
        assert_eq!(cmds[0].params.as_slice(), &[9, 9]);
        assert_eq!(cmds[0].args(), CommandArgs::Raw);
        assert_eq!(cmds[0].name(), None);
        assert_eq!(opcode_label(0x1234), "Opcode4660");
    }

    #[test]
    fn test_semantic_args() {
        let cmds = decode_commands(&sample_stream()).unwrap();
        assert_eq!(cmds[0].args(), CommandArgs::VolumeBus { bus_name_index: 1, volume: 10000 });
        assert_eq!(
            cmds[1].args(),
            CommandArgs::NoteOn { target: Reference::new(ReferenceKind::Synth, 3) }
        );
        assert_eq!(cmds[2].args(), CommandArgs::Delay { millis: 256 });
        assert_eq!(cmds[3].args(), CommandArgs::Null);

        let c = Command::new(op::CATEGORY, &[0, 0, 0, 1, 0, 0, 0, 5]);
        assert_eq!(c.args(), CommandArgs::Category { extra: Some(1), category_id: 5 });
        let c = Command::new(op::POS3D_DISTANCE_MAX, &1.5f32.to_be_bytes());
        assert_eq!(c.args(), CommandArgs::Pos3dDistanceMax(1.5));
        let c = Command::new(op::LOOP_START, &[0, 1, 0xFF, 0xFF]);
        assert_eq!(c.args(), CommandArgs::LoopStart { loop_id: 1, count: LOOP_INDEFINITE });
    }

    #[test]
    fn test_known_opcode_wrong_size_is_raw() {
        assert_eq!(Command::new(op::DELAY, &[1, 2]).args(), CommandArgs::Raw);
        assert_eq!(Command::new(op::CATEGORY, &[1, 2, 3]).args(), CommandArgs::Raw);
    }

    #[test]
    fn test_note_target() {
        let c = Command::new(op::NOTE_ON_WITH_NO, &[0, 1, 0, 7, 0, 3]);
        assert_eq!(
            c.note_target().unwrap().unwrap(),
            Reference::new(ReferenceKind::Waveform, 7)
        );
        assert!(Command::new(op::DELAY, &[0, 0, 0, 1]).note_target().is_none());
        assert!(Command::new(op::NOTE_ON, &[0, 1]).note_target().unwrap().is_err());
    }

    #[test]
    fn test_encode_rejects_long_params() {
        let c = Command::new(op::NULL, &[0; 256]);
        assert!(matches!(encode_commands(&[c]), Err(Error::Layout(_))));
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(opcode_name(0), Some("Null"));
        assert_eq!(opcode_name(111), Some("VolumeBus"));
        assert_eq!(opcode_name(124), Some("StopAtLoopEnd"));
        assert_eq!(opcode_name(125), None);
        assert_eq!(opcode_name(2003), Some("NoteOnWithNo"));
        assert_eq!(opcode_name(8004), Some("StartTouchSenseEffectWithPriority"));
    }
}
