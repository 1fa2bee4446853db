//! CLI for the RDM download manager.

mod download;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use rdm_core::config;
use rdm_core::integrity::Checksum;
use std::path::PathBuf;
use url::Url;

use download::run_download;

/// `rdm <URL> <DESTINATION> [options]`
#[derive(Debug, Parser)]
#[command(name = "rdm", version)]
#[command(about = "RDM: resumable single-file HTTP(S) downloader", long_about = None)]
pub struct Cli {
    /// HTTP or HTTPS URL to download.
    #[arg(value_parser = parse_url)]
    pub url: Url,

    /// Where to save the file. Bytes are staged in `<DESTINATION>.part` until complete.
    pub destination: PathBuf,

    /// Maximum download attempts, including the first (config default: 3).
    #[arg(short = 'r', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: Option<u32>,

    /// Timeout in seconds for each attempt (config default: 300).
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds (config default: 30).
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Expected checksum of the finished file, e.g. `sha256:<64 hex digits>`.
    /// On mismatch the file is moved to `quarantine/` beside the destination.
    #[arg(short = 'c', long, value_name = "ALGO:HEX", value_parser = parse_checksum)]
    pub checksum: Option<Checksum>,
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        run_download(self, &cfg)
    }
}

/// Process exit code for an argument error: 0 for `--help`/`--version`, 1 otherwise.
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn parse_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("invalid URL '{}': {}", s, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}': only http and https are allowed", other)),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("URL '{}' has no host", s));
    }
    Ok(url)
}

fn parse_checksum(s: &str) -> Result<Checksum, String> {
    Checksum::parse(s).map_err(|e| e.to_string())
}
