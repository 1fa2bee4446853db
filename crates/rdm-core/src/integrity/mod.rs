//! Post-download integrity: checksum verification and quarantine.
//!
//! A mismatch is not a transfer failure. The file is moved aside into
//! `quarantine/` next to the destination so it can still be inspected.

mod checksum;
mod quarantine;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use checksum::{verify, Algorithm, Checksum};
pub use quarantine::{quarantine, quarantine_dir, verify_or_quarantine, IntegrityVerdict};

/// Checksum parse and verification errors, distinct from a plain mismatch.
#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("invalid checksum '{0}': expected 'algorithm:hexhash'")]
    Format(String),

    #[error("unknown checksum algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("{0} checksums are not supported; use sha256 or sha512")]
    Unsupported(Algorithm),

    #[error("invalid hex digits in checksum '{0}'")]
    InvalidHex(String),

    #[error("{algorithm} checksum must have {expected} hex digits, got {actual}")]
    Length {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },

    #[error("cannot read {} for checksum", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch but {} could not be quarantined", .path.display())]
    Quarantine {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
