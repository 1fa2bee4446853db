//! The on-disk staging artifact for one destination.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use super::writer::StagingWriter;

/// Staging file for a destination: `<destination>.part`.
///
/// At most one exists per destination; the transfer executor is the only
/// writer while an attempt is in flight.
#[derive(Debug, Clone)]
pub struct PartialFile {
    path: PathBuf,
}

impl PartialFile {
    pub fn for_destination(destination: &Path) -> Self {
        Self {
            path: super::staging_path(destination),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current staged size; 0 when no staging file exists.
    pub fn current_size(&self) -> io::Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Offset to resume from, discarding leftovers that cannot be resumed.
    ///
    /// An empty staging file is removed. If the size cannot be read the file is
    /// removed as well and the download starts fresh.
    pub fn resume_offset(&self) -> u64 {
        match self.current_size() {
            Ok(0) => {
                self.remove_quietly();
                0
            }
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not inspect staging file, starting fresh");
                self.remove_quietly();
                0
            }
        }
    }

    /// Open for one attempt: truncate when `offset` is 0, append otherwise.
    ///
    /// `offset` must equal the staged size, or the appended bytes would land at
    /// the wrong position.
    pub fn open(&self, offset: u64) -> io::Result<StagingWriter> {
        let file = if offset == 0 {
            File::options()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?
        } else {
            let file = File::options().append(true).open(&self.path)?;
            let staged = file.metadata()?.len();
            if staged != offset {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("staged size {} does not match resume offset {}", staged, offset),
                ));
            }
            file
        };
        Ok(StagingWriter::new(file, offset))
    }

    /// Delete the staging file. A missing file is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Delete the staging file only if it holds no bytes.
    pub fn remove_if_empty(&self) {
        if matches!(self.current_size(), Ok(0)) {
            self.remove_quietly();
        }
    }

    fn remove_quietly(&self) {
        if let Err(e) = self.remove() {
            tracing::warn!(path = %self.path.display(), error = %e, "could not remove staging file");
        }
    }

    /// Atomically rename the staging file onto `final_path`.
    /// Fails (rather than copying) when `final_path` is on a different filesystem.
    pub fn finalize(&self, final_path: &Path) -> io::Result<()> {
        fs::rename(&self.path, final_path)
    }
}
