//! Archive writers that collect named entries into a single ZIP.

use std::io::{Cursor, Write};

use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::Compression;
use crate::error::{Error, Result};

/// Sink for named archive entries.
///
/// `add_file` is synchronous so that a caller holding a lock never suspends
/// mid-entry. `finalize` consumes the writer: it can only run once and no
/// entry can be added afterwards.
pub trait ArchiveWriter: Send {
    /// Appends one entry to the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written. The archive should
    /// be considered broken afterwards.
    fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Completes the archive and returns its bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing directory cannot be written.
    fn finalize(self) -> Result<Bytes>;
}

/// In-memory ZIP writer.
pub struct ZipArchiveWriter {
    inner: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    entries: usize,
}

impl ZipArchiveWriter {
    /// Creates a writer that stores entries without compression.
    #[must_use]
    pub fn new() -> Self {
        Self::with_compression(Compression::Stored)
    }

    /// Creates a writer using the given entry compression.
    #[must_use]
    pub fn with_compression(compression: Compression) -> Self {
        let method = match compression {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        };
        Self {
            inner: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(method)
                .unix_permissions(0o644),
            entries: 0,
        }
    }
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn add_file(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Archive("entry name cannot be empty".to_string()));
        }
        let large = u32::try_from(bytes.len()).is_err();
        let options = self.options.clone().large_file(large);
        self.inner.start_file(name, options)?;
        self.inner.write_all(bytes)?;
        self.entries += 1;
        Ok(())
    }

    fn finalize(self) -> Result<Bytes> {
        let cursor = self.inner.finish()?;
        log::debug!("Finalized archive with {} entries", self.entries);
        Ok(Bytes::from(cursor.into_inner()))
    }
}
