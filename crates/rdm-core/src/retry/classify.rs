//! Classify a finished attempt (transport code + HTTP status) for retry decisions.

use crate::transport::TransportCode;

/// Retry class of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely to succeed if retried (network trouble, server-side 5xx).
    Transient,
    /// Retrying is pointless (4xx, malformed input, certificate failure).
    Permanent,
    /// Not explicitly enumerated; retried conservatively.
    Unknown,
}

impl ErrorClass {
    /// Transient and Unknown both earn another attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Permanent)
    }
}

/// Classify an HTTP status code; `None` for statuses that are not errors.
pub fn classify_http_status(status: u32) -> Option<ErrorClass> {
    match status {
        500..=599 => Some(ErrorClass::Transient),
        400..=499 => Some(ErrorClass::Permanent),
        _ => None,
    }
}

/// Classify a transport outcome code.
pub fn classify_transport(code: TransportCode) -> ErrorClass {
    match code {
        TransportCode::TimedOut
        | TransportCode::ConnectionRefused
        | TransportCode::PartialTransfer
        | TransportCode::SendError
        | TransportCode::RecvError
        | TransportCode::EmptyResponse => ErrorClass::Transient,
        TransportCode::MalformedUrl
        | TransportCode::UnsupportedScheme
        | TransportCode::LocalIo
        | TransportCode::Tls
        | TransportCode::Aborted => ErrorClass::Permanent,
        TransportCode::Ok | TransportCode::Other(_) => ErrorClass::Unknown,
    }
}

/// Classify an attempt. An HTTP error status (0 when no response arrived)
/// takes precedence over the transport code.
pub fn classify(code: TransportCode, status: u32) -> ErrorClass {
    classify_http_status(status).unwrap_or_else(|| classify_transport(code))
}
