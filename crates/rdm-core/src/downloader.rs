//! Resumable single-file download orchestrator.
//!
//! One [`Downloader::download`] call walks an explicit state machine:
//!
//! ```text
//! Init -> ProbingSize -> CheckingDiskSpace -> Attempting -> Verifying -> Finalizing -> Completed
//!                                             Attempting -> RestartingFromZero -> Attempting
//!                                             Attempting -> BackingOff -> Attempting
//!                                             (any) -> Failed
//! ```
//!
//! Bytes go to `<destination>.part`; the destination itself is only touched by
//! the final rename.

mod attempt;
mod range;

pub use range::{negotiate, RangeVerdict};

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RdmConfig;
use crate::disk_space::{DiskSpaceGuard, SpaceVerdict};
use crate::error::{FailureReason, TransferOutcome};
use crate::progress::{format_bytes, ProgressReporter};
use crate::retry::{classify, ErrorClass, RetryDecision, RetryPolicy};
use crate::storage::{ensure_parent_dir, PartialFile};
use crate::transport::{AttemptRequest, CurlOptions, CurlTransport, Transport, TransportReport};

use attempt::{AttemptAbort, AttemptReport};

/// One download job. Immutable for the life of a `download` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Upper bound for one whole attempt.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Attempts including the first; at least one is always made.
    pub max_attempts: u32,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }

    /// Timeouts and attempt budget from the `[network]` and `[retry]` sections.
    pub fn with_config(mut self, cfg: &RdmConfig) -> Self {
        self.timeout = Duration::from_secs(cfg.network.timeout_secs);
        self.connect_timeout = Duration::from_secs(cfg.network.connect_timeout_secs);
        self.max_attempts = cfg.retry.max_attempts;
        self
    }
}

/// Final result of one `download` call.
#[derive(Debug)]
pub struct DownloadReport {
    pub outcome: TransferOutcome,
    /// Budgeted attempts used (the range restart is not counted).
    pub attempts: u32,
    /// Size of the published file; staged size on failure.
    pub bytes: u64,
    /// The server ignored a range request and the download started over.
    pub restarted: bool,
}

impl DownloadReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Failure reason with its causes, `None` on success.
    pub fn error_message(&self) -> Option<String> {
        let reason = self.outcome.reason()?;
        let mut msg = reason.to_string();
        let mut source = std::error::Error::source(reason);
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        Some(msg)
    }
}

#[derive(Debug)]
enum State {
    Init,
    ProbingSize,
    CheckingDiskSpace,
    Attempting,
    RestartingFromZero,
    BackingOff(Duration),
    /// `expected` is the staged size the server announced, if it did.
    Verifying { expected: Option<u64> },
    Finalizing,
    Completed,
    Failed(TransferOutcome),
}

/// Per-call bookkeeping; nothing here outlives one `download`.
struct Run<'a> {
    request: &'a TransferRequest,
    partial: PartialFile,
    policy: RetryPolicy,
    /// 1-based budgeted attempt index.
    attempt: u32,
    offset: u64,
    probed_total: Option<u64>,
    disk_checked: bool,
    /// Set after a restart: never send `Range` again in this call.
    ranges_ignored: bool,
    restarted: bool,
    bytes: u64,
}

impl Run<'_> {
    fn url(&self) -> &str {
        &self.request.url
    }

    fn destination(&self) -> &Path {
        &self.request.destination
    }

    fn attempt_request(&self) -> AttemptRequest<'_> {
        AttemptRequest {
            url: &self.request.url,
            resume_from: self.offset,
            connect_timeout: self.request.connect_timeout,
            timeout: self.request.timeout,
        }
    }

    fn report(self, outcome: TransferOutcome) -> DownloadReport {
        let bytes = match outcome {
            TransferOutcome::Success => self.bytes,
            _ => self.partial.current_size().unwrap_or(0),
        };
        DownloadReport {
            outcome,
            attempts: self.attempt,
            bytes,
            restarted: self.restarted,
        }
    }

    /// Local failures: keep resumable bytes, drop an empty staging file.
    fn fail_local(&self, reason: FailureReason) -> State {
        self.partial.remove_if_empty();
        State::Failed(TransferOutcome::FatalFailure(reason))
    }
}

/// Runs downloads one at a time against a [`Transport`].
pub struct Downloader {
    transport: Box<dyn Transport>,
    guard: DiskSpaceGuard,
    progress: ProgressReporter,
    backoff: RetryPolicy,
    rng: StdRng,
    sleeper: Box<dyn FnMut(Duration) + Send>,
}

impl Downloader {
    /// Defaults: 10% disk margin, progress on stdout, 1s base delay with ±20% jitter.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            guard: DiskSpaceGuard::default(),
            progress: ProgressReporter::stdout(),
            backoff: RetryPolicy::default(),
            rng: StdRng::from_entropy(),
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// curl transport and policies from the loaded configuration.
    pub fn from_config(cfg: &RdmConfig) -> Self {
        let transport = CurlTransport::new(CurlOptions {
            user_agent: cfg.network.user_agent.clone(),
            max_redirects: cfg.network.max_redirects,
            ..CurlOptions::default()
        });
        Self::new(transport)
            .with_disk_guard(DiskSpaceGuard::new(cfg.disk.safety_margin_percent))
            .with_backoff(cfg.retry.base_delay(), cfg.retry.jitter)
    }

    pub fn with_disk_guard(mut self, guard: DiskSpaceGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, jitter: f64) -> Self {
        self.backoff.base_delay = base_delay;
        self.backoff.jitter = jitter;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Replace the blocking backoff sleep.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Download `request.url` to `request.destination`, resuming from any
    /// staged bytes left by an earlier run.
    pub fn download(&mut self, request: &TransferRequest) -> DownloadReport {
        let mut run = Run {
            request,
            partial: PartialFile::for_destination(&request.destination),
            policy: RetryPolicy {
                max_attempts: request.max_attempts.max(1),
                ..self.backoff
            },
            attempt: 1,
            offset: 0,
            probed_total: None,
            disk_checked: false,
            ranges_ignored: false,
            restarted: false,
            bytes: 0,
        };
        tracing::info!(url = %request.url, dest = %request.destination.display(), "download started");

        let mut state = State::Init;
        loop {
            tracing::trace!(?state, attempt = run.attempt, offset = run.offset, "state");
            state = match state {
                State::Init => self.init(&mut run),
                State::ProbingSize => self.probe_size(&mut run),
                State::CheckingDiskSpace => self.check_disk_space(&mut run),
                State::Attempting => self.attempt(&mut run),
                State::RestartingFromZero => self.restart_from_zero(&mut run),
                State::BackingOff(delay) => self.back_off(&mut run, delay),
                State::Verifying { expected } => Self::verify(&mut run, expected),
                State::Finalizing => Self::finalize(&run),
                State::Completed => {
                    tracing::info!(
                        dest = %request.destination.display(),
                        bytes = run.bytes,
                        attempts = run.attempt,
                        "download completed"
                    );
                    return run.report(TransferOutcome::Success);
                }
                State::Failed(outcome) => {
                    if let Some(reason) = outcome.reason() {
                        tracing::error!(url = %request.url, attempts = run.attempt, "download failed: {}", reason);
                    }
                    return run.report(outcome);
                }
            };
        }
    }

    fn init(&mut self, run: &mut Run<'_>) -> State {
        if let Err(source) = ensure_parent_dir(run.destination()) {
            return State::Failed(TransferOutcome::FatalFailure(FailureReason::CreateDir {
                path: run.destination().to_path_buf(),
                source,
            }));
        }
        run.offset = run.partial.resume_offset();
        if run.offset > 0 {
            tracing::info!(offset = run.offset, "resuming from staged bytes");
            self.progress.note(&format!(
                "Resuming download from byte {} ({})",
                run.offset,
                format_bytes(run.offset)
            ));
        }
        State::ProbingSize
    }

    fn probe_size(&mut self, run: &mut Run<'_>) -> State {
        let probe = AttemptRequest {
            resume_from: 0,
            ..run.attempt_request()
        };
        run.probed_total = self.transport.probe_length(&probe);
        match run.probed_total {
            Some(total) if total < run.offset => {
                tracing::warn!(total, staged = run.offset, "staged file larger than remote resource, starting over");
                if let Err(e) = run.partial.remove() {
                    tracing::warn!(error = %e, "could not remove stale staging file");
                }
                run.offset = 0;
                State::CheckingDiskSpace
            }
            Some(total) => {
                tracing::debug!(total, "size preflight");
                State::CheckingDiskSpace
            }
            None => {
                tracing::debug!("size unknown, disk check deferred to first progress sample");
                State::Attempting
            }
        }
    }

    fn check_disk_space(&mut self, run: &mut Run<'_>) -> State {
        let total = run.probed_total.unwrap_or(0);
        let remaining = total.saturating_sub(run.offset);
        run.disk_checked = true;
        match self.guard.check(run.destination(), remaining) {
            SpaceVerdict::Insufficient {
                required,
                available,
            } => run.fail_local(FailureReason::InsufficientSpace {
                path: run.destination().to_path_buf(),
                required,
                available,
                margin_percent: self.guard.margin_percent(),
            }),
            SpaceVerdict::Sufficient | SpaceVerdict::Unknown => State::Attempting,
        }
    }

    fn attempt(&mut self, run: &mut Run<'_>) -> State {
        let writer = match run.partial.open(run.offset) {
            Ok(w) => w,
            Err(source) => {
                return run.fail_local(FailureReason::OpenStaging {
                    path: run.partial.path().to_path_buf(),
                    source,
                })
            }
        };
        tracing::info!(attempt = run.attempt, max = run.policy.max_attempts, offset = run.offset, "attempt started");
        let report = attempt::execute(
            self.transport.as_mut(),
            &run.attempt_request(),
            writer,
            run.destination(),
            &self.guard,
            &mut self.progress,
            run.disk_checked,
        );
        run.disk_checked = report.disk_checked;

        match negotiate(run.offset, report.transport.status, report.received, run.probed_total) {
            RangeVerdict::RestartFromZero if run.restarted => {
                return State::Failed(TransferOutcome::FatalFailure(FailureReason::RangeIgnored {
                    url: run.url().to_string(),
                }))
            }
            RangeVerdict::RestartFromZero => return State::RestartingFromZero,
            RangeVerdict::AlreadyComplete => {
                tracing::info!(offset = run.offset, "staging file already holds the whole resource");
                return State::Verifying {
                    expected: run.probed_total,
                };
            }
            RangeVerdict::Resumed { bytes_so_far } => {
                tracing::debug!(bytes_so_far, "range honoured");
            }
            RangeVerdict::NotResumed | RangeVerdict::Classify => {}
        }

        self.judge(run, report)
    }

    /// Outcome of an attempt that was not a range special case.
    fn judge(&mut self, run: &mut Run<'_>, report: AttemptReport) -> State {
        match report.abort {
            Some(AttemptAbort::DiskSpace {
                required,
                available,
            }) => {
                return run.fail_local(FailureReason::InsufficientSpace {
                    path: run.destination().to_path_buf(),
                    required,
                    available,
                    margin_percent: self.guard.margin_percent(),
                })
            }
            Some(AttemptAbort::Write(source)) => {
                return run.fail_local(FailureReason::WriteStaging {
                    path: run.partial.path().to_path_buf(),
                    source,
                })
            }
            Some(AttemptAbort::RangeIgnored) | None => {}
        }

        let transport = report.transport;
        if transport.code.is_ok() && (200..300).contains(&transport.status) {
            return State::Verifying {
                expected: transport.content_length.map(|len| run.offset + len),
            };
        }

        let class = classify(transport.code, transport.status);
        let reason = failure_reason(run.url(), transport);
        if class == ErrorClass::Unknown {
            tracing::warn!(attempt = run.attempt, "unclassified failure, retrying conservatively: {}", reason);
        } else {
            tracing::debug!(attempt = run.attempt, ?class, "attempt failed: {}", reason);
        }
        match run.policy.decide(run.attempt, class, &mut self.rng) {
            RetryDecision::RetryAfter(delay) => {
                self.progress.note(&format!(
                    "Attempt {}/{} failed: {}. Retrying in {:.1}s...",
                    run.attempt,
                    run.policy.max_attempts,
                    reason,
                    delay.as_secs_f64()
                ));
                State::BackingOff(delay)
            }
            RetryDecision::NoRetry if class.is_retryable() => {
                State::Failed(TransferOutcome::RetryableFailure(reason))
            }
            RetryDecision::NoRetry => State::Failed(TransferOutcome::FatalFailure(reason)),
        }
    }

    fn restart_from_zero(&mut self, run: &mut Run<'_>) -> State {
        tracing::warn!(url = %run.url(), offset = run.offset, "server ignored range request, restarting from zero");
        self.progress
            .note("Server does not support resume; restarting download from the beginning");
        if let Err(e) = run.partial.remove() {
            // open(0) truncates anyway.
            tracing::warn!(error = %e, "could not remove staging file before restart");
        }
        run.offset = 0;
        run.ranges_ignored = true;
        run.restarted = true;
        if run.probed_total.is_some() {
            State::CheckingDiskSpace
        } else {
            run.disk_checked = false;
            State::Attempting
        }
    }

    fn back_off(&mut self, run: &mut Run<'_>, delay: Duration) -> State {
        tracing::info!(attempt = run.attempt, delay_ms = delay.as_millis() as u64, "backing off");
        (self.sleeper)(delay);
        run.attempt += 1;
        run.offset = if run.ranges_ignored {
            0
        } else {
            // The failed attempt may have advanced the staged size.
            run.partial.current_size().unwrap_or(0)
        };
        State::Attempting
    }

    fn verify(run: &mut Run<'_>, expected: Option<u64>) -> State {
        let actual = match run.partial.current_size() {
            Ok(size) => size,
            Err(source) => {
                return run.fail_local(FailureReason::OpenStaging {
                    path: run.partial.path().to_path_buf(),
                    source,
                })
            }
        };
        if let Some(expected) = expected {
            if actual != expected {
                if let Err(e) = run.partial.remove() {
                    tracing::warn!(error = %e, "could not remove inconsistent staging file");
                }
                return State::Failed(TransferOutcome::FatalFailure(FailureReason::SizeMismatch {
                    path: run.destination().to_path_buf(),
                    expected,
                    actual,
                }));
            }
        }
        run.bytes = actual;
        State::Finalizing
    }

    fn finalize(run: &Run<'_>) -> State {
        match run.partial.finalize(run.destination()) {
            Ok(()) => State::Completed,
            Err(source) => run.fail_local(FailureReason::Rename {
                from: run.partial.path().to_path_buf(),
                to: run.destination().to_path_buf(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("guard", &self.guard)
            .field("progress", &self.progress)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// HTTP error statuses win over the transport code.
fn failure_reason(url: &str, transport: TransportReport) -> FailureReason {
    if transport.status >= 400 {
        FailureReason::Http {
            url: url.to_string(),
            status: transport.status,
        }
    } else {
        FailureReason::Transport {
            url: url.to_string(),
            code: transport.code,
            detail: transport.detail,
        }
    }
}
