//! Progress reporting for a download (bytes so far, rate, ETA).
//!
//! The reporter consumes cumulative samples from the transfer executor and
//! decides when to render. On a terminal it redraws one line at most five
//! times per second; when output is redirected it prints whole lines, at most
//! once per second and only after a full percentage point of progress.

mod format;

pub use format::{format_bytes, format_duration, format_rate, render_bar};

use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::time::{Duration, Instant};

/// No output during the first moments of an attempt (near-instant transfers).
const INITIAL_QUIET: Duration = Duration::from_millis(500);
/// Terminal redraw interval (5 per second).
const INTERACTIVE_INTERVAL: Duration = Duration::from_millis(200);
/// Minimum spacing between lines for redirected output.
const PLAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of download progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Resume offset plus bytes received during this attempt.
    pub bytes_so_far: u64,
    /// Total expected size in bytes, 0 if unknown.
    pub total: u64,
    /// Time since the attempt started.
    pub elapsed: Duration,
    /// This attempt's bytes over elapsed time, in bytes per second.
    pub rate: f64,
}

impl ProgressSnapshot {
    /// Percentage complete, `None` when the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.bytes_so_far as f64 / self.total as f64 * 100.0).min(100.0))
    }

    /// Estimated seconds remaining (None if rate is 0 or total unknown).
    pub fn eta_secs(&self) -> Option<u64> {
        if self.total == 0 || self.rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.bytes_so_far);
        Some((remaining as f64 / self.rate).round() as u64)
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.bytes_so_far >= self.total
    }
}

/// Rate-limited progress renderer writing to an output sink.
pub struct ProgressReporter {
    sink: Box<dyn Write + Send>,
    interactive: bool,
    resume_offset: u64,
    started: Instant,
    last_emit: Option<Instant>,
    last_percent: Option<f64>,
    last_bytes: u64,
    line_open: bool,
    completed: bool,
}

impl ProgressReporter {
    pub fn new(sink: Box<dyn Write + Send>, interactive: bool) -> Self {
        Self {
            sink,
            interactive,
            resume_offset: 0,
            started: Instant::now(),
            last_emit: None,
            last_percent: None,
            last_bytes: 0,
            line_open: false,
            completed: false,
        }
    }

    /// Standard output, interactive when it is a terminal.
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        Self::new(Box::new(io::stdout()), interactive)
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self::new(Box::new(io::sink()), false)
    }

    /// Reset timers for a new attempt that starts at `resume_offset`.
    pub fn begin_attempt(&mut self, resume_offset: u64, now: Instant) {
        self.resume_offset = resume_offset;
        self.started = now;
        self.last_emit = None;
        self.last_percent = None;
        self.last_bytes = resume_offset;
        self.completed = false;
    }

    /// Feed a cumulative sample of this attempt. Returns the snapshot when it
    /// was rendered, `None` when suppressed.
    pub fn sample(
        &mut self,
        total_this_attempt: u64,
        bytes_this_attempt: u64,
        now: Instant,
    ) -> Option<ProgressSnapshot> {
        let bytes_so_far = (self.resume_offset + bytes_this_attempt).max(self.last_bytes);
        self.last_bytes = bytes_so_far;
        let total = if total_this_attempt > 0 {
            self.resume_offset + total_this_attempt
        } else {
            0
        };
        let elapsed = now.saturating_duration_since(self.started);
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            bytes_this_attempt as f64 / secs
        } else {
            0.0
        };
        let snap = ProgressSnapshot {
            bytes_so_far,
            total,
            elapsed,
            rate,
        };
        if !self.should_emit(&snap, now) {
            return None;
        }
        self.render(&snap);
        self.last_emit = Some(now);
        self.last_percent = snap.percent();
        if snap.is_complete() {
            self.completed = true;
        }
        Some(snap)
    }

    fn should_emit(&self, snap: &ProgressSnapshot, now: Instant) -> bool {
        if snap.is_complete() {
            return !self.completed;
        }
        if snap.total == 0 && snap.bytes_so_far == 0 {
            return false;
        }
        if snap.elapsed < INITIAL_QUIET {
            return false;
        }
        let since_last = now.saturating_duration_since(self.last_emit.unwrap_or(self.started));
        if self.interactive {
            return since_last >= INTERACTIVE_INTERVAL;
        }
        if since_last < PLAIN_INTERVAL {
            return false;
        }
        match (snap.percent(), self.last_percent) {
            (Some(pct), Some(last)) => pct >= last + 1.0,
            _ => true,
        }
    }

    fn render(&mut self, snap: &ProgressSnapshot) {
        let line = match snap.percent() {
            Some(pct) => format!(
                "{} {:.1}% | {} / {} | {} | ETA: {}",
                render_bar(pct),
                pct,
                format_bytes(snap.bytes_so_far),
                format_bytes(snap.total),
                format_rate(snap.rate),
                format_duration(snap.eta_secs()),
            ),
            None if self.interactive => format!(
                "Downloaded: {} | Speed: {}",
                format_bytes(snap.bytes_so_far),
                format_rate(snap.rate)
            ),
            None => format!(
                "Downloaded: {} | Elapsed: {}",
                format_bytes(snap.bytes_so_far),
                format_duration(Some(snap.elapsed.as_secs()))
            ),
        };
        let result = if self.interactive {
            self.line_open = true;
            write!(self.sink, "\r{}\x1b[K", line).and_then(|()| self.sink.flush())
        } else {
            writeln!(self.sink, "{}", line)
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "progress output failed");
        }
    }

    /// Print a one-line note, closing any open progress line first.
    pub fn note(&mut self, message: &str) {
        self.finish();
        if let Err(e) = writeln!(self.sink, "{}", message) {
            tracing::debug!(error = %e, "progress output failed");
        }
    }

    /// Terminate an in-place progress line.
    pub fn finish(&mut self) {
        if self.line_open {
            self.line_open = false;
            if let Err(e) = writeln!(self.sink) {
                tracing::debug!(error = %e, "progress output failed");
            }
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interactive", &self.interactive)
            .field("resume_offset", &self.resume_offset)
            .finish_non_exhaustive()
    }
}
