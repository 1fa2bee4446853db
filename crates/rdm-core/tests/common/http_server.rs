//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a single static body. HEAD answers with Content-Length; GET honours
//! `Range: bytes=N-` with 206 unless ranges are switched off. Responses can be
//! forced to an error status or cut short to simulate a dropped connection.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Answer every GET with this status and an empty body.
    pub force_status: Option<u16>,
    /// The first `cut_first` GETs announce the full length but close after
    /// `cut_at` body bytes.
    pub cut_first: usize,
    pub cut_at: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            force_status: None,
            cut_first: 0,
            cut_at: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    heads: AtomicUsize,
    gets: AtomicUsize,
    ranged_gets: AtomicUsize,
}

/// Handle to a running server. The server thread lives until the process exits.
pub struct TestServer {
    pub url: String,
    counters: Arc<Counters>,
}

impl TestServer {
    pub fn heads(&self) -> usize {
        self.counters.heads.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    /// GETs that carried a `Range` header.
    pub fn ranged_gets(&self) -> usize {
        self.counters.ranged_gets.load(Ordering::SeqCst)
    }
}

pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let counters = Arc::new(Counters::default());
    let shared = Arc::clone(&counters);
    thread::spawn(move || {
        // Connections are served one at a time so GET ordering is deterministic.
        for stream in listener.incoming().flatten() {
            handle(stream, &body, opts, &shared);
        }
    });
    TestServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        counters,
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
        if data.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(data).ok()
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions, counters: &Counters) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let request = match read_head(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let (method, range_start) = parse_request(&request);
    let total = body.len();

    if method.eq_ignore_ascii_case("HEAD") {
        counters.heads.fetch_add(1, Ordering::SeqCst);
        let response = if opts.head_allowed {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                total
            )
        } else {
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        };
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let index = counters.gets.fetch_add(1, Ordering::SeqCst);
    if range_start.is_some() {
        counters.ranged_gets.fetch_add(1, Ordering::SeqCst);
    }
    if let Some(status) = opts.force_status {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status,
            reason(status)
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let (status, extra, slice) = match range_start.filter(|_| opts.support_ranges) {
        Some(start) if start >= total => (
            416,
            format!("Content-Range: bytes */{}\r\n", total),
            &body[0..0],
        ),
        Some(start) => (
            206,
            format!("Content-Range: bytes {}-{}/{}\r\n", start, total - 1, total),
            &body[start..],
        ),
        None => (200, String::new(), body),
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        reason(status),
        slice.len(),
        extra
    );
    let _ = stream.write_all(response.as_bytes());
    if index < opts.cut_first {
        let cut = opts.cut_at.min(slice.len());
        let _ = stream.write_all(&slice[..cut]);
        let _ = stream.flush();
        let _ = stream.shutdown(Shutdown::Both);
        return;
    }
    let _ = stream.write_all(slice);
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Returns (method, start offset of `Range: bytes=N-`).
fn parse_request(request: &str) -> (&str, Option<usize>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = value
                    .trim()
                    .strip_prefix("bytes=")
                    .and_then(|spec| spec.split('-').next())
                    .and_then(|start| start.trim().parse::<usize>().ok());
            }
        }
    }
    (method, range)
}
