//! Download outcomes and the reasons a download can fail.
//!
//! Expected network and local conditions are values, never panics: every
//! component reports through [`TransferOutcome`] and [`FailureReason`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportCode;

/// Result of an attempt or of a whole download.
#[derive(Debug)]
pub enum TransferOutcome {
    Success,
    /// Worth retrying (Transient or Unknown class).
    RetryableFailure(FailureReason),
    /// Retrying cannot help (Permanent class or local failure).
    FatalFailure(FailureReason),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            TransferOutcome::Success => None,
            TransferOutcome::RetryableFailure(r) | TransferOutcome::FatalFailure(r) => Some(r),
        }
    }
}

/// Why a download did not complete. Each variant names the URL or path involved.
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("download of {url} failed: {code}{}", detail_suffix(.detail))]
    Transport {
        url: String,
        code: TransportCode,
        detail: Option<String>,
    },

    #[error("HTTP error {status} ({}) from {url}", reason_phrase(.status))]
    Http { url: String, status: u32 },

    #[error("{url} ignored the range request again after restarting from zero")]
    RangeIgnored { url: String },

    #[error("failed to create directory for {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open staging file {}", .path.display())]
    OpenStaging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write staging file {}", .path.display())]
    WriteStaging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "insufficient disk space for {}: need {required} bytes (including {margin_percent}% margin) but only {available} available",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
        margin_percent: u8,
    },

    #[error("file size mismatch for {}: expected {expected} bytes but got {actual}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("download succeeded but failed to rename {} to {}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!(" ({})", d),
        _ => String::new(),
    }
}

/// Short reason phrase for the status codes users run into most.
pub fn reason_phrase(status: &u32) -> &'static str {
    match *status {
        200 => "OK",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        410 => "Gone",
        416 => "Range Not Satisfiable",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}
