//! Incremental parsing of HTTP response header lines.
//!
//! libcurl hands the header callback one line at a time, including the status
//! line of every redirect hop. A new status line starts a fresh block; the
//! blank line that ends a block completes it.

/// Status and length of one completed response header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
}

#[derive(Debug, Default)]
pub(crate) struct HeadParser {
    status: u32,
    content_length: Option<u64>,
    last: Option<ResponseHead>,
}

impl HeadParser {
    /// Feed one raw header line. Returns the block when `raw` terminates it.
    pub(crate) fn feed(&mut self, raw: &[u8]) -> Option<ResponseHead> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            if self.status == 0 {
                return None;
            }
            let head = ResponseHead {
                status: self.status,
                content_length: self.content_length,
            };
            self.last = Some(head);
            self.status = 0;
            return Some(head);
        }
        if line.starts_with("HTTP/") {
            self.status = line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0);
            self.content_length = None;
            return None;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse::<u64>().ok();
            }
        }
        None
    }

    /// The most recently completed block (the final response after redirects).
    pub(crate) fn last(&self) -> Option<ResponseHead> {
        self.last
    }
}
