//! `rdm <URL> <DESTINATION>`: run one download, then the optional checksum check.

use anyhow::{anyhow, bail, Context, Result};
use rdm_core::config::RdmConfig;
use rdm_core::integrity::{verify_or_quarantine, IntegrityVerdict};
use rdm_core::progress::format_bytes;
use rdm_core::{DownloadReport, Downloader, TransferRequest};
use std::time::Duration;

use super::Cli;

pub fn run_download(cli: &Cli, cfg: &RdmConfig) -> Result<()> {
    let request = build_request(cli, cfg);
    println!("Downloading: {}", request.url);
    println!("Saving to: {}", request.destination.display());

    let mut downloader = Downloader::from_config(cfg);
    let report = downloader.download(&request);
    if !report.is_success() {
        let msg = report
            .error_message()
            .unwrap_or_else(|| "download failed".to_string());
        return Err(anyhow!(msg));
    }
    println!("{}", summary_line(&report));

    let Some(expected) = &cli.checksum else {
        return Ok(());
    };
    let verdict = verify_or_quarantine(&request.destination, expected)
        .with_context(|| format!("checksum verification failed for {}", request.destination.display()))?;
    match verdict {
        IntegrityVerdict::Verified => {
            println!("Checksum verified ({})", expected.algorithm());
            Ok(())
        }
        IntegrityVerdict::Quarantined { actual, moved_to } => bail!(
            "checksum mismatch for {}: expected {} but got {}:{}; file moved to {}",
            request.destination.display(),
            expected,
            expected.algorithm(),
            actual,
            moved_to.display()
        ),
    }
}

/// Config values first, then command-line overrides.
pub(super) fn build_request(cli: &Cli, cfg: &RdmConfig) -> TransferRequest {
    let mut request = TransferRequest::new(cli.url.as_str(), &cli.destination).with_config(cfg);
    if let Some(n) = cli.max_retries {
        request.max_attempts = n;
    }
    if let Some(secs) = cli.timeout {
        request.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.connect_timeout {
        request.connect_timeout = Duration::from_secs(secs);
    }
    request
}

pub(super) fn summary_line(report: &DownloadReport) -> String {
    let mut line = format!("Download completed successfully ({})", format_bytes(report.bytes));
    let retries = report.attempts.saturating_sub(1);
    if retries > 0 {
        line.push_str(&format!(
            " after {} {}",
            retries,
            if retries == 1 { "retry" } else { "retries" }
        ));
    }
    if report.restarted {
        line.push_str(", restarted once because the server ignored the resume request");
    }
    line
}
