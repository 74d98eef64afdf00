//! @UTF table codec.
//!
//! Every structured blob in a cue sheet is one of these self-describing
//! tables: a schema of typed fields, fixed-width rows, and two heaps.
//! All multi-byte values are big-endian.
//!
//! ## Table Structure
//!
//! ```text
//! +----------------------+
//! | Magic: "@UTF"        |  4 bytes
//! | Table size           |  u32, bytes after this field
//! +----------------------+  <- offsets below are relative to here
//! | Reserved / encoding  |  u8, u8 (0 = Shift-JIS, 1 = UTF-8)
//! | Row offset           |  u16
//! | String heap offset   |  u32
//! | Blob heap offset     |  u32
//! | Table name           |  u32 string offset
//! | Columns / row width  |  u16, u16
//! | Row count            |  u32
//! +----------------------+
//! | Field descriptors    |  flags, [name], [default]
//! +----------------------+
//! | Rows                 |  per-row fields only
//! +----------------------+
//! | String heap          |  NUL-terminated, after zero padding
//! +----------------------+
//! | Blob heap            |  after zero padding
//! +----------------------+
//! | Padding              |  0-3 zero bytes to a 4-byte boundary
//! +----------------------+
//! ```
//!
//! Blob cells starting with `@UTF` or `AFS2` are decoded as nested tables
//! or archives.

mod format;
mod reader;
mod table;
mod value;
mod writer;
pub mod dump;

pub use format::*;
pub use reader::parse_prefix;
pub use table::*;
pub use value::*;

#[cfg(test)]
mod tests;
