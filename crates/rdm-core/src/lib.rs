//! Resumable single-file HTTP(S) download engine.
//!
//! [`Downloader`] drives one download at a time through probe, disk check,
//! ranged attempts with retry, size verification and atomic publish. The
//! [`integrity`] module checks the published file against an expected checksum.

pub mod config;
pub mod logging;

pub mod disk_space;
pub mod downloader;
pub mod error;
pub mod integrity;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod transport;

pub use downloader::{DownloadReport, Downloader, TransferRequest};
pub use error::{FailureReason, TransferOutcome};
