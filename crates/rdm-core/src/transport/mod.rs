//! Narrow transport interface used by the transfer executor.
//!
//! A transport performs one HTTP(S) attempt and reports streamed bytes and
//! periodic progress through a [`TransferSink`]. The concrete libcurl adapter
//! is [`CurlTransport`]; the orchestrator only ever sees this interface.

mod easy;
mod headers;

use std::fmt;
use std::time::Duration;

pub use easy::{CurlOptions, CurlTransport};

/// Parameters for one outbound request.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub url: &'a str,
    /// Byte offset to resume from; `0` sends no `Range` header.
    pub resume_from: u64,
    pub connect_timeout: Duration,
    /// Upper bound for the whole attempt, including the body.
    pub timeout: Duration,
}

/// Receives the streamed response of one attempt.
///
/// Every method returns `false` to abort the transfer.
pub trait TransferSink {
    /// Called once per response header block (redirect hops included).
    fn on_response(&mut self, status: u32, content_length: Option<u64>) -> bool;
    /// Called per received body chunk of the final response.
    fn on_data(&mut self, chunk: &[u8]) -> bool;
    /// Cumulative byte counts for this attempt; `total` is 0 when unknown.
    /// May be invoked zero or many times per second.
    fn on_progress(&mut self, total: u64, received: u64) -> bool;
}

/// Transport-level result code of an attempt, independent of any library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    Ok,
    TimedOut,
    ConnectionRefused,
    /// Connection closed before the announced body length arrived.
    PartialTransfer,
    SendError,
    RecvError,
    /// Server accepted the connection but sent nothing.
    EmptyResponse,
    MalformedUrl,
    UnsupportedScheme,
    /// Local file read/write failed inside the transport.
    LocalIo,
    /// TLS handshake or certificate validation failure.
    Tls,
    /// The sink asked the transport to stop.
    Aborted,
    /// Any other library-specific code.
    Other(i32),
}

impl TransportCode {
    pub fn is_ok(self) -> bool {
        self == TransportCode::Ok
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportCode::Ok => write!(f, "ok"),
            TransportCode::TimedOut => write!(f, "operation timed out"),
            TransportCode::ConnectionRefused => write!(f, "connection refused"),
            TransportCode::PartialTransfer => write!(f, "connection closed mid-transfer"),
            TransportCode::SendError => write!(f, "failed sending data"),
            TransportCode::RecvError => write!(f, "failure receiving data"),
            TransportCode::EmptyResponse => write!(f, "empty response from server"),
            TransportCode::MalformedUrl => write!(f, "malformed URL"),
            TransportCode::UnsupportedScheme => write!(f, "unsupported protocol"),
            TransportCode::LocalIo => write!(f, "local file I/O failure"),
            TransportCode::Tls => write!(f, "TLS/certificate failure"),
            TransportCode::Aborted => write!(f, "transfer aborted"),
            TransportCode::Other(code) => write!(f, "transport error code {}", code),
        }
    }
}

/// What the transport observed once an attempt finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReport {
    pub code: TransportCode,
    /// Final HTTP status, `0` if no response was received.
    pub status: u32,
    /// `Content-Length` of the final response, if announced.
    pub content_length: Option<u64>,
    /// Library description of the failure, when there was one.
    pub detail: Option<String>,
}

impl TransportReport {
    pub fn failed(code: TransportCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            status: 0,
            content_length: None,
            detail: Some(detail.into()),
        }
    }
}

/// Something that can perform one attempt and report streamed bytes and
/// periodic progress.
pub trait Transport: Send {
    /// Best-effort size-only preflight. `None` when the server does not
    /// answer usefully; never an error.
    fn probe_length(&mut self, request: &AttemptRequest<'_>) -> Option<u64>;

    /// Perform one GET, streaming the body into `sink`.
    fn perform(&mut self, request: &AttemptRequest<'_>, sink: &mut dyn TransferSink)
        -> TransportReport;
}
