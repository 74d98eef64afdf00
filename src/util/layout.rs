//! Alignment and padding helpers shared by the table and archive codecs.

use super::{Error, Result};

/// Largest alignment the table reader will infer for a zero gap.
pub const MAX_INFERRED_ALIGN: u64 = 256;

/// Round `pos` up to a multiple of `align` (`align` >= 1).
#[inline]
pub const fn align_up(pos: u64, align: u64) -> u64 {
    if align <= 1 {
        pos
    } else {
        pos.div_ceil(align) * align
    }
}

/// Round `pos` up to a multiple of `align`, or `None` on overflow.
///
/// Used wherever `pos` comes from the input rather than from a buffer length.
#[inline]
pub const fn checked_align_up(pos: u64, align: u64) -> Option<u64> {
    if align <= 1 {
        Some(pos)
    } else {
        pos.checked_next_multiple_of(align)
    }
}

/// Number of padding bytes needed to bring `pos` to a multiple of `align`.
#[inline]
pub const fn pad_len(pos: u64, align: u64) -> u64 {
    align_up(pos, align) - pos
}

/// Fail unless every byte in `bytes` is zero; `base` is the position of `bytes[0]`.
pub fn check_zero(bytes: &[u8], base: u64) -> Result<()> {
    match bytes.iter().position(|&b| b != 0) {
        Some(i) => Err(Error::NonZeroPadding(base + i as u64)),
        None => Ok(()),
    }
}

/// Bit set of power-of-two alignments (bit k = alignment 2^k, up to 256)
/// for which padding from `unpadded` yields `actual`.
pub fn alignment_candidates(unpadded: u64, actual: u64) -> u16 {
    let mut set = 0u16;
    let mut align = 1u64;
    let mut bit = 0;
    while align <= MAX_INFERRED_ALIGN {
        if checked_align_up(unpadded, align) == Some(actual) {
            set |= 1 << bit;
        }
        align <<= 1;
        bit += 1;
    }
    set
}

/// All alignments allowed (no observation yet).
pub const ANY_ALIGNMENT: u16 = 0x1FF;

/// Smallest alignment in a candidate set.
pub fn smallest_alignment(set: u16) -> Option<u32> {
    if set == 0 {
        None
    } else {
        Some(1u32 << set.trailing_zeros())
    }
}

/// Infer the alignment that explains a single observed gap.
pub fn infer_alignment(what: &'static str, unpadded: u64, actual: u64) -> Result<u32> {
    smallest_alignment(alignment_candidates(unpadded, actual)).ok_or(Error::OffsetMismatch {
        what,
        stored: actual,
        computed: unpadded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 8), 40);
        assert_eq!(align_up(7, 1), 7);
        assert_eq!(pad_len(30, 4), 2);
        assert_eq!(checked_align_up(33, 8), Some(40));
        assert_eq!(checked_align_up(u64::MAX - 1, 32), None);
        assert_eq!(checked_align_up(u64::MAX, 1), Some(u64::MAX));
        assert_eq!(alignment_candidates(u64::MAX - 3, u64::MAX - 3), 0b111);
    }

    #[test]
    fn test_check_zero() {
        assert!(check_zero(&[0, 0, 0], 10).is_ok());
        assert!(matches!(check_zero(&[0, 1], 10), Err(Error::NonZeroPadding(11))));
    }

    #[test]
    fn test_infer_alignment() {
        assert_eq!(infer_alignment("x", 40, 40).unwrap(), 1);
        assert_eq!(infer_alignment("x", 41, 48).unwrap(), 8);
        assert_eq!(infer_alignment("x", 33, 64).unwrap(), 32);
        assert!(infer_alignment("x", 33, 50).is_err());
        assert!(infer_alignment("x", 40, 30).is_err());
    }

    #[test]
    fn test_candidate_intersection() {
        // Gap 41 -> 48 allows 8 and 16; 100 -> 112 allows 16 only.
        let a = alignment_candidates(41, 48);
        let b = alignment_candidates(100, 112);
        assert_eq!(smallest_alignment(a), Some(8));
        assert_eq!(smallest_alignment(a & b), Some(16));
    }
}
