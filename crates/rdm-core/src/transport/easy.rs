//! libcurl adapter: bridges curl's easy-handle callbacks to [`TransferSink`].

use std::cell::RefCell;
use std::time::Duration;

use curl::easy::Easy;

use super::headers::HeadParser;
use super::{AttemptRequest, TransferSink, Transport, TransportCode, TransportReport};

/// Handle-level options that stay fixed across attempts.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub user_agent: String,
    /// Redirect chain limit.
    pub max_redirects: u32,
    /// Ceiling for the HEAD preflight, independent of the transfer timeout.
    pub probe_timeout: Duration,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("rdm/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 5,
            probe_timeout: Duration::from_secs(30),
        }
    }
}

/// [`Transport`] backed by a fresh curl easy handle per request.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    /// Common handle setup: URL, TLS verification, redirects, timeouts.
    fn configure(&self, easy: &mut Easy, request: &AttemptRequest<'_>) -> Result<(), curl::Error> {
        easy.url(request.url)?;
        easy.ssl_verify_peer(true)?;
        easy.ssl_verify_host(true)?;
        easy.follow_location(true)?;
        easy.max_redirections(self.options.max_redirects)?;
        easy.useragent(&self.options.user_agent)?;
        easy.connect_timeout(request.connect_timeout)?;
        easy.timeout(request.timeout)?;
        Ok(())
    }

    fn run_get(
        &self,
        easy: &mut Easy,
        request: &AttemptRequest<'_>,
        sink: &mut dyn TransferSink,
        parser: &RefCell<HeadParser>,
    ) -> Result<(), curl::Error> {
        self.configure(easy, request)?;
        if request.resume_from > 0 {
            // Sends `Range: bytes=N-`; curl does not judge the reply, the negotiator does.
            easy.range(&format!("{}-", request.resume_from))?;
        }
        easy.progress(true)?;

        let sink = RefCell::new(sink);
        let mut transfer = easy.transfer();
        transfer.header_function(|line| match parser.borrow_mut().feed(line) {
            Some(head) => sink
                .borrow_mut()
                .on_response(head.status, head.content_length),
            None => true,
        })?;
        transfer.write_function(|data| {
            if sink.borrow_mut().on_data(data) {
                Ok(data.len())
            } else {
                Ok(0) // abort transfer
            }
        })?;
        transfer.progress_function(|dltotal, dlnow, _, _| {
            sink.borrow_mut()
                .on_progress(clamp_count(dltotal), clamp_count(dlnow))
        })?;
        transfer.perform()
    }
}

impl Transport for CurlTransport {
    fn probe_length(&mut self, request: &AttemptRequest<'_>) -> Option<u64> {
        let parser = RefCell::new(HeadParser::default());
        let mut easy = Easy::new();
        let probe = AttemptRequest {
            timeout: request.timeout.min(self.options.probe_timeout),
            ..*request
        };
        let result = self.configure(&mut easy, &probe).and_then(|()| {
            easy.nobody(true)?; // HEAD request
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                parser.borrow_mut().feed(line);
                true
            })?;
            transfer.perform()
        });
        if let Err(e) = result {
            tracing::debug!(url = request.url, error = %e, "size preflight failed");
            return None;
        }
        let head = parser.into_inner().last()?;
        if !(200..300).contains(&head.status) {
            tracing::debug!(url = request.url, status = head.status, "size preflight not usable");
            return None;
        }
        head.content_length.filter(|&len| len > 0)
    }

    fn perform(
        &mut self,
        request: &AttemptRequest<'_>,
        sink: &mut dyn TransferSink,
    ) -> TransportReport {
        let parser = RefCell::new(HeadParser::default());
        let mut easy = Easy::new();
        let result = self.run_get(&mut easy, request, sink, &parser);

        let head = parser.into_inner().last();
        let status = easy
            .response_code()
            .ok()
            .filter(|&code| code != 0)
            .or(head.map(|h| h.status))
            .unwrap_or(0);
        let content_length = head.and_then(|h| h.content_length);

        match result {
            Ok(()) => TransportReport {
                code: TransportCode::Ok,
                status,
                content_length,
                detail: None,
            },
            Err(e) => TransportReport {
                code: transport_code(&e),
                status,
                content_length,
                detail: Some(e.to_string()),
            },
        }
    }
}

/// curl reports counts as doubles; negative or NaN means unknown.
fn clamp_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

/// Map a curl error onto the library-independent code set.
fn transport_code(e: &curl::Error) -> TransportCode {
    if e.is_operation_timedout() {
        TransportCode::TimedOut
    } else if e.is_couldnt_connect() {
        TransportCode::ConnectionRefused
    } else if e.is_partial_file() {
        TransportCode::PartialTransfer
    } else if e.is_send_error() {
        TransportCode::SendError
    } else if e.is_recv_error() {
        TransportCode::RecvError
    } else if e.is_got_nothing() {
        TransportCode::EmptyResponse
    } else if e.is_url_malformed() {
        TransportCode::MalformedUrl
    } else if e.is_unsupported_protocol() {
        TransportCode::UnsupportedScheme
    } else if e.is_write_error() || e.is_aborted_by_callback() {
        TransportCode::Aborted
    } else if e.is_read_error() || e.is_file_couldnt_read_file() {
        TransportCode::LocalIo
    } else if e.is_ssl_certproblem()
        || e.is_peer_failed_verification()
        || e.is_ssl_connect_error()
        || e.is_ssl_cacert()
        || e.is_ssl_cacert_badfile()
    {
        TransportCode::Tls
    } else {
        TransportCode::Other(e.code() as i32)
    }
}
