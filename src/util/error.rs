//! Error types for the ACB library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ACB operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at the start of a table or archive
    #[error("Invalid magic: expected {expected:?}, found {found:02X?}")]
    InvalidMagic {
        expected: &'static str,
        found: [u8; 4],
    },

    /// Stream ends before a structure it declares
    #[error("Unexpected end of data at position {0}")]
    UnexpectedEof(u64),

    /// A stored offset disagrees with the one recomputed while parsing
    #[error("Offset mismatch for {what}: stored {stored}, computed {computed}")]
    OffsetMismatch {
        what: &'static str,
        stored: u64,
        computed: u64,
    },

    /// Padding region contains non-zero bytes
    #[error("Non-zero padding at position {0}")]
    NonZeroPadding(u64),

    /// Any other malformed layout
    #[error("Invalid format: {0}")]
    Format(String),

    /// Command stream ends inside a command
    #[error("Truncated command at byte {offset}: needs {needed} bytes, {available} available")]
    TruncatedCommand {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Command stream has bytes left that cannot start a command
    #[error("Trailing bytes in command stream at byte {offset} ({count} bytes)")]
    TrailingBytes { offset: usize, count: usize },

    /// Field name is not part of the table schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Field has neither a shared default nor per-row storage
    #[error("Field has no storage: {0}")]
    NoStorage(String),

    /// No waveform maps to the given archive entry id
    #[error("Unknown archive id: {0}")]
    UnknownArchiveId(u64),

    /// Cue id already present in the cue table
    #[error("Duplicate cue id: {0}")]
    DuplicateCueId(u64),

    /// Archive entry id already present
    #[error("Duplicate archive id: {0}")]
    DuplicateId(u64),

    /// Split archive id fields where the unused one is not the sentinel
    #[error("Inconsistent archive id fields in waveform row {row} (streaming: {streaming})")]
    InconsistentIdField { row: usize, streaming: bool },

    /// Archive entries cannot be laid out in their current order
    #[error("Archive layout error: {0}")]
    Layout(String),

    /// Value type does not match the field type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Row index out of bounds
    #[error("Row index {index} out of bounds (count: {count})")]
    RowOutOfBounds { index: usize, count: usize },

    /// Named table is not present in the cue sheet
    #[error("Missing table: {0}")]
    MissingTable(String),

    /// Encoding tag has no registered codec (or the codec lacks the operation)
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Codec rejected a payload
    #[error("Codec error: {0}")]
    Codec(String),

    /// Content hash disagrees with freshly serialized bytes after a mutation
    #[error("Content hash mismatch after mutation")]
    HashMismatch,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// True for errors raised while parsing malformed bytes.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic { .. }
                | Self::UnexpectedEof(_)
                | Self::OffsetMismatch { .. }
                | Self::NonZeroPadding(_)
                | Self::Format(_)
        )
    }

    /// True for command-stream decoding failures.
    pub fn is_command(&self) -> bool {
        matches!(self, Self::TruncatedCommand { .. } | Self::TrailingBytes { .. })
    }
}

/// Result type alias for ACB operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::InvalidMagic { expected: "@UTF", found: *b"AFS2" };
        assert!(e.to_string().contains("@UTF"));

        let e = Error::RowOutOfBounds { index: 5, count: 3 };
        assert!(e.to_string().contains("5"));
        assert!(e.to_string().contains("3"));
    }

    #[test]
    fn test_error_groups() {
        assert!(Error::NonZeroPadding(12).is_format());
        assert!(Error::format("bad").is_format());
        assert!(!Error::DuplicateCueId(1).is_format());
        assert!(Error::TrailingBytes { offset: 3, count: 1 }.is_command());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
