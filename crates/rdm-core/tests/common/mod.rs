#![allow(dead_code)]

pub mod http_server;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rdm_core::disk_space::DiskSpaceGuard;
use rdm_core::progress::ProgressReporter;
use rdm_core::transport::CurlTransport;
use rdm_core::Downloader;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic body: not a repeating short pattern, so misplaced bytes show.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 251) % 256) as u8).collect()
}

/// Backoff sleeps recorded instead of slept.
pub type Sleeps = Arc<Mutex<Vec<Duration>>>;

/// Real curl transport, silent progress, seeded jitter, no real sleeping.
/// `free_bytes` is what the destination volume reports as available.
pub fn downloader(free_bytes: u64) -> (Downloader, Sleeps) {
    let sleeps: Sleeps = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&sleeps);
    let downloader = Downloader::new(CurlTransport::default())
        .with_progress(ProgressReporter::silent())
        .with_disk_guard(DiskSpaceGuard::with_probe(
            move |_: &Path| -> io::Result<u64> { Ok(free_bytes) },
            10,
        ))
        .with_rng(StdRng::seed_from_u64(42))
        .with_sleeper(move |d| recorded.lock().unwrap().push(d));
    (downloader, sleeps)
}
