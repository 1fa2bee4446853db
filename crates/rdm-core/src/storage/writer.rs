//! Append-only writer for the staging file of one attempt.

use std::fs::File;
use std::io::{self, Write};

/// Writer owned by the transfer executor for the duration of one attempt.
///
/// Each chunk goes straight to the file (no user-space buffering), so a byte
/// counted in [`StagingWriter::offset`] has been handed to the OS and survives
/// the process being killed.
#[derive(Debug)]
pub struct StagingWriter {
    file: File,
    start: u64,
    written: u64,
}

impl StagingWriter {
    pub(crate) fn new(file: File, start: u64) -> Self {
        Self {
            file,
            start,
            written: 0,
        }
    }

    /// Append `data` at the end of the staged bytes.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes appended by this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Absolute offset of the next byte (resume offset + bytes appended).
    pub fn offset(&self) -> u64 {
        self.start + self.written
    }

    /// Sync file data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}
