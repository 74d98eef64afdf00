//! # ACB
//!
//! Rust implementation of the CRI ACB cue sheet format and its AFS2
//! companion archives (.awb).
//!
//! The format belongs to CRI Middleware. This is an independent
//! implementation that reads and writes containers byte-exactly so that
//! single assets can be inspected, extracted or replaced without the
//! authoring tool.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (value types, byte cursors, errors)
//! - [`utf`] - @UTF self-describing table codec
//! - [`afs2`] - AFS2 indexed blob archive codec
//! - [`codec`] - Audio payload codecs routed by encoding tag
//! - [`acb`] - Cue sheets: cue graph, command bytecode and builder
//!
//! ## Example
//!
//! ```ignore
//! use acb::prelude::*;
//!
//! let mut sheet = CueSheet::open("se.acb", None, &LoadOptions::default())?;
//! let adx = std::fs::read("jump.adx")?;
//! let (cue_id, _) = sheet.add_waveform_and_cue(false, adx, EncodeType::ADX, Some("jump"), None, None)?;
//! sheet.save("se.acb", None)?;
//! ```

pub mod util;
pub mod utf;
pub mod afs2;
pub mod codec;
pub mod acb;

// Re-export commonly used types
pub use util::{Error, Result, ValueType};
pub use utf::{Blob, Table, Value};
pub use afs2::Archive;
pub use acb::CueSheet;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, ValueType};
    pub use crate::utf::{Blob, Field, Table, Value};
    pub use crate::afs2::Archive;
    pub use crate::codec::{AudioCodec, AudioInfo, CodecRegistry, EncodeType};
    pub use crate::acb::{
        CueSheet, ExtractOptions, HashStatus, LoadOptions, Reference, ReferenceKind, TableKind, Visit, Visitor,
    };
}
