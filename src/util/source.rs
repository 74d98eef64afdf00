//! Whole-file input sources.
//!
//! Containers are parsed from complete in-memory buffers. Files are
//! memory-mapped when possible and read into a buffer otherwise.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use super::{Error, Result};

/// Bytes of a whole file, either mapped or read.
pub enum FileBytes {
    /// Memory-mapped file (preferred)
    Mmap(Mmap),
    /// Buffered read (fallback, and for empty files)
    Buffer(Vec<u8>),
}

impl FileBytes {
    /// Open a file, memory-mapping it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, true)
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if use_mmap && size > 0 {
            // Safety: the file is opened read-only and the map is dropped
            // before any write through this crate.
            let mmap = unsafe { Mmap::map(&file) }?;
            Ok(Self::Mmap(mmap))
        } else {
            Ok(Self::Buffer(std::fs::read(path)?))
        }
    }
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mmap(m) => m,
            Self::Buffer(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_mapped_and_buffered() -> Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b"@UTF\0\0\0\0")?;
        temp.flush()?;

        let mapped = FileBytes::open(temp.path())?;
        let read = FileBytes::open_opts(temp.path(), false)?;
        assert_eq!(&mapped[..], &read[..]);
        assert_eq!(&mapped[..4], b"@UTF");
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = FileBytes::open("/nonexistent/file.acb");
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
