//! AFS2 archive codec.
//!
//! An AFS2 archive maps integer ids to aligned byte ranges. It appears both
//! as a standalone companion file (`.awb`) and embedded in a table cell,
//! sometimes as a header-only summary. All values are little-endian.
//!
//! ## Archive Structure
//!
//! ```text
//! +------------------+
//! | Magic: "AFS2"    |  4 bytes
//! +------------------+
//! | Version          |  u8
//! | Position width   |  u8 (1, 2, 4 or 8)
//! | Id width         |  u8 (1, 2, 4 or 8)
//! | Reserved         |  u8
//! | Entry count      |  u32
//! | Alignment        |  u16 (always 32)
//! | Key              |  u16
//! +------------------+
//! | Ids              |  count * id width
//! | Positions        |  count * position width
//! | End position     |  position width
//! +------------------+
//! | Entries          |  each zero-padded to the alignment
//! +------------------+
//! ```
//!
//! A stored position is where the previous entry ended; the entry itself
//! starts at the next aligned offset.

mod archive;
mod format;
mod reader;
mod writer;

pub use archive::*;
pub use format::*;
