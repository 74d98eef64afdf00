//! AFS2 format constants.

/// Magic bytes at the start of an archive.
pub const AFS2_MAGIC: &[u8; 4] = b"AFS2";

/// Entry alignment. Archives declaring anything else are rejected.
pub const AFS2_ALIGN: u16 = 32;

/// Size of the fixed part of the header.
pub const FIXED_HEADER_SIZE: usize = 16;

/// Version byte written for new archives.
pub const DEFAULT_VERSION: u8 = 2;

/// Position width for new archives.
pub const DEFAULT_POSITION_WIDTH: u8 = 4;

/// Id width for new archives.
pub const DEFAULT_ID_WIDTH: u8 = 2;

/// Header size for `count` entries with the given field widths.
#[inline]
pub const fn header_size(count: usize, position_width: u8, id_width: u8) -> usize {
    FIXED_HEADER_SIZE + count * id_width as usize + (count + 1) * position_width as usize
}

/// Largest value a field of `width` bytes holds.
#[inline]
pub const fn width_max(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width as u32)) - 1
    }
}

#[inline]
pub const fn is_valid_width(width: u8) -> bool {
    matches!(width, 1 | 2 | 4 | 8)
}
