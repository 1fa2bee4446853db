//! Transfer executor: drives one attempt into the staging file.

use std::io;
use std::path::Path;
use std::time::Instant;

use crate::disk_space::{DiskSpaceGuard, SpaceVerdict};
use crate::progress::ProgressReporter;
use crate::storage::StagingWriter;
use crate::transport::{AttemptRequest, TransferSink, Transport, TransportReport};

/// Why the executor stopped a transfer on its own.
#[derive(Debug)]
pub(crate) enum AttemptAbort {
    /// A ranged request was answered with the full body.
    RangeIgnored,
    DiskSpace { required: u64, available: u64 },
    Write(io::Error),
}

/// Everything the orchestrator needs to judge a finished attempt.
#[derive(Debug)]
pub(crate) struct AttemptReport {
    pub transport: TransportReport,
    /// Body bytes appended to the staging file during this attempt.
    pub received: u64,
    pub abort: Option<AttemptAbort>,
    /// A disk check has run, either before or during this attempt.
    pub disk_checked: bool,
}

/// Per-attempt state handed to the transport callbacks.
struct AttemptContext<'a> {
    writer: StagingWriter,
    destination: &'a Path,
    guard: &'a DiskSpaceGuard,
    progress: &'a mut ProgressReporter,
    resumed: bool,
    disk_checked: bool,
    /// Final response is 2xx and its body belongs in the staging file.
    accepting: bool,
    abort: Option<AttemptAbort>,
}

impl AttemptContext<'_> {
    fn check_space(&mut self, remaining: u64) -> bool {
        self.disk_checked = true;
        match self.guard.check(self.destination, remaining) {
            SpaceVerdict::Insufficient {
                required,
                available,
            } => {
                self.abort = Some(AttemptAbort::DiskSpace {
                    required,
                    available,
                });
                false
            }
            SpaceVerdict::Sufficient | SpaceVerdict::Unknown => true,
        }
    }
}

impl TransferSink for AttemptContext<'_> {
    fn on_response(&mut self, status: u32, content_length: Option<u64>) -> bool {
        self.accepting = (200..300).contains(&status);
        if self.resumed && status == 200 {
            // Refuse the body so the staged prefix is never duplicated.
            self.abort = Some(AttemptAbort::RangeIgnored);
            return false;
        }
        match content_length {
            Some(len) if self.accepting && len > 0 && !self.disk_checked => self.check_space(len),
            _ => true,
        }
    }

    fn on_data(&mut self, chunk: &[u8]) -> bool {
        if !self.accepting {
            return true;
        }
        match self.writer.append(chunk) {
            Ok(()) => true,
            Err(e) => {
                self.abort = Some(AttemptAbort::Write(e));
                false
            }
        }
    }

    fn on_progress(&mut self, total: u64, received: u64) -> bool {
        if !self.accepting {
            return true;
        }
        if total > 0 && !self.disk_checked && !self.check_space(total) {
            return false;
        }
        self.progress.sample(total, received, Instant::now());
        true
    }
}

/// Run one attempt, appending the response body to `writer`.
pub(crate) fn execute(
    transport: &mut dyn Transport,
    request: &AttemptRequest<'_>,
    writer: StagingWriter,
    destination: &Path,
    guard: &DiskSpaceGuard,
    progress: &mut ProgressReporter,
    disk_checked: bool,
) -> AttemptReport {
    progress.begin_attempt(request.resume_from, Instant::now());
    let mut ctx = AttemptContext {
        writer,
        destination,
        guard,
        progress,
        resumed: request.resume_from > 0,
        disk_checked,
        accepting: false,
        abort: None,
    };
    let transport_report = transport.perform(request, &mut ctx);
    ctx.progress.finish();

    // Flush what arrived even when the attempt failed; it is the next resume point.
    if let Err(e) = ctx.writer.sync() {
        if ctx.abort.is_none() {
            ctx.abort = Some(AttemptAbort::Write(e));
        }
    }
    tracing::debug!(
        url = request.url,
        resume_from = request.resume_from,
        status = transport_report.status,
        code = %transport_report.code,
        received = ctx.writer.written(),
        staged = ctx.writer.offset(),
        "attempt finished"
    );
    AttemptReport {
        transport: transport_report,
        received: ctx.writer.written(),
        abort: ctx.abort,
        disk_checked: ctx.disk_checked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PartialFile;
    use crate::transport::TransportCode;
    use std::time::Duration;

    /// Replays one canned response through the sink, honouring aborts.
    struct Canned {
        status: u32,
        content_length: Option<u64>,
        /// Total reported by progress samples when the headers carry none.
        progress_total: Option<u64>,
        body: Vec<u8>,
    }

    impl Transport for Canned {
        fn probe_length(&mut self, _request: &AttemptRequest<'_>) -> Option<u64> {
            None
        }

        fn perform(
            &mut self,
            _request: &AttemptRequest<'_>,
            sink: &mut dyn TransferSink,
        ) -> TransportReport {
            let aborted = TransportReport {
                code: TransportCode::Aborted,
                status: self.status,
                content_length: self.content_length,
                detail: None,
            };
            if !sink.on_response(self.status, self.content_length) {
                return aborted;
            }
            let total = self.progress_total.or(self.content_length).unwrap_or(0);
            let mut sent = 0u64;
            for chunk in self.body.chunks(16) {
                if !sink.on_data(chunk) {
                    return aborted;
                }
                sent += chunk.len() as u64;
                if !sink.on_progress(total, sent) {
                    return aborted;
                }
            }
            TransportReport {
                code: TransportCode::Ok,
                ..aborted
            }
        }
    }

    fn request(url: &str, resume_from: u64) -> AttemptRequest<'_> {
        AttemptRequest {
            url,
            resume_from,
            connect_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        }
    }

    fn plenty() -> DiskSpaceGuard {
        DiskSpaceGuard::with_probe(|_: &Path| -> io::Result<u64> { Ok(u64::MAX) }, 10)
    }

    #[test]
    fn fresh_attempt_writes_body() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        let mut t = Canned {
            status: 200,
            content_length: Some(40),
            progress_total: None,
            body: vec![9u8; 40],
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 0),
            partial.open(0).unwrap(),
            &dest,
            &plenty(),
            &mut ProgressReporter::silent(),
            false,
        );
        assert!(report.abort.is_none());
        assert!(report.disk_checked);
        assert_eq!(report.received, 40);
        assert_eq!(partial.current_size().unwrap(), 40);
    }

    #[test]
    fn full_body_on_resume_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        std::fs::write(partial.path(), b"0123456789").unwrap();
        let mut t = Canned {
            status: 200,
            content_length: Some(20),
            progress_total: None,
            body: b"0123456789abcdefghij".to_vec(),
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 10),
            partial.open(10).unwrap(),
            &dest,
            &plenty(),
            &mut ProgressReporter::silent(),
            false,
        );
        assert!(matches!(report.abort, Some(AttemptAbort::RangeIgnored)));
        assert_eq!(report.received, 0);
        assert_eq!(partial.current_size().unwrap(), 10);
    }

    #[test]
    fn error_body_is_not_staged() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        let mut t = Canned {
            status: 404,
            content_length: Some(9),
            progress_total: None,
            body: b"not found".to_vec(),
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 0),
            partial.open(0).unwrap(),
            &dest,
            &plenty(),
            &mut ProgressReporter::silent(),
            false,
        );
        assert_eq!(report.transport.status, 404);
        assert_eq!(report.received, 0);
        assert!(!report.disk_checked);
    }

    #[test]
    fn short_disk_aborts_before_first_byte() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        let guard = DiskSpaceGuard::with_probe(|_: &Path| -> io::Result<u64> { Ok(100) }, 10);
        let mut t = Canned {
            status: 200,
            content_length: Some(1000),
            progress_total: None,
            body: vec![1u8; 1000],
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 0),
            partial.open(0).unwrap(),
            &dest,
            &guard,
            &mut ProgressReporter::silent(),
            false,
        );
        match report.abort {
            Some(AttemptAbort::DiskSpace {
                required,
                available,
            }) => {
                assert_eq!(required, 1100);
                assert_eq!(available, 100);
            }
            other => panic!("unexpected abort {:?}", other),
        }
        assert_eq!(report.received, 0);
    }

    #[test]
    fn preflight_checked_attempt_skips_guard() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        let guard = DiskSpaceGuard::with_probe(|_: &Path| -> io::Result<u64> { Ok(0) }, 10);
        let mut t = Canned {
            status: 200,
            content_length: Some(32),
            progress_total: None,
            body: vec![1u8; 32],
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 0),
            partial.open(0).unwrap(),
            &dest,
            &guard,
            &mut ProgressReporter::silent(),
            true,
        );
        assert!(report.abort.is_none());
        assert_eq!(report.received, 32);
    }

    #[test]
    fn total_first_seen_in_progress_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        let guard = DiskSpaceGuard::with_probe(|_: &Path| -> io::Result<u64> { Ok(100) }, 10);
        let mut t = Canned {
            status: 200,
            content_length: None,
            progress_total: Some(1000),
            body: vec![1u8; 1000],
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 0),
            partial.open(0).unwrap(),
            &dest,
            &guard,
            &mut ProgressReporter::silent(),
            false,
        );
        match report.abort {
            Some(AttemptAbort::DiskSpace {
                required,
                available,
            }) => {
                assert_eq!(required, 1100);
                assert_eq!(available, 100);
            }
            other => panic!("unexpected abort {:?}", other),
        }
        assert!(report.disk_checked);
        assert_eq!(report.transport.code, TransportCode::Aborted);
        // Only the chunk delivered before the first progress sample.
        assert_eq!(report.received, 16);
    }

    #[test]
    fn failed_append_aborts_and_keeps_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let partial = PartialFile::for_destination(&dest);
        std::fs::write(partial.path(), b"0123456789").unwrap();
        // A read-only handle makes every append fail.
        let writer = StagingWriter::new(std::fs::File::open(partial.path()).unwrap(), 10);
        let mut t = Canned {
            status: 206,
            content_length: Some(20),
            progress_total: None,
            body: vec![7u8; 20],
        };
        let report = execute(
            &mut t,
            &request("http://h/f", 10),
            writer,
            &dest,
            &plenty(),
            &mut ProgressReporter::silent(),
            true,
        );
        assert!(matches!(report.abort, Some(AttemptAbort::Write(_))));
        assert_eq!(report.received, 0);
        assert_eq!(std::fs::read(partial.path()).unwrap(), b"0123456789");
    }
}
