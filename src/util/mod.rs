//! Utility types and functions for the ACB library.
//!
//! This module contains fundamental types used throughout the library:
//! - [`ValueType`] - Column storage types of @UTF tables
//! - [`Error`] / [`Result`] - Error handling
//! - [`ByteReader`] / [`ByteWriter`] - Endian-aware cursors
//! - [`FileBytes`] - Whole-file input
//! - alignment helpers shared by both codecs

mod bytes;
mod error;
mod layout;
mod source;
mod value_type;

pub use bytes::*;
pub use error::*;
pub use layout::*;
pub use source::*;
pub use value_type::*;
