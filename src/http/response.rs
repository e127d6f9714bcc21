//! Response composition.
//!
//! # Responsibilities
//! - Build the status line, `Content-Length`, `Date` and handler headers
//! - Append the body verbatim (omitted for HEAD)
//! - Hand the caller a pooled buffer it releases after the write
//!
//! # Design Decisions
//! - `Content-Length` and `Date` are always emitted by the composer; handler
//!   attempts to set them are ignored
//! - Header lines containing CR or LF are dropped to prevent response splitting

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::BytesMut;
use http::StatusCode;

use crate::pool::{Pool, Pooled};

/// Protocol version written on every status line.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// A fully composed response. Its buffer returns to the pool on drop.
pub type ComposedResponse = Pooled<BytesMut>;

/// Builds wire-exact responses into pooled buffers.
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    buffers: Arc<Pool<BytesMut>>,
}

impl ResponseComposer {
    pub fn new(buffers: Arc<Pool<BytesMut>>) -> Self {
        Self { buffers }
    }

    /// The buffer pool backing this composer.
    pub fn buffers(&self) -> &Arc<Pool<BytesMut>> {
        &self.buffers
    }

    /// Status-only response with `Content-Length: 0`.
    pub fn status(&self, status: StatusCode) -> ComposedResponse {
        self.compose(status, &[], &[], true)
    }

    /// Response with a body and no extra headers.
    pub fn body(&self, status: StatusCode, body: &[u8]) -> ComposedResponse {
        self.compose(status, &[], body, true)
    }

    /// Compose a response. `Content-Length` always reflects `body`, even when
    /// `include_body` is false (HEAD).
    pub fn compose(
        &self,
        status: StatusCode,
        headers: &[(String, String)],
        body: &[u8],
        include_body: bool,
    ) -> ComposedResponse {
        let mut buf = self.buffers.acquire();
        buf.reserve(128 + body.len());

        // Writing into a BytesMut cannot fail.
        let _ = write!(
            buf,
            "{} {} {}\r\n",
            HTTP_VERSION,
            status.as_str(),
            status.canonical_reason().unwrap_or("")
        );
        let _ = write!(buf, "Content-Length: {}\r\n", body.len());
        let _ = write!(buf, "Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()));

        for (name, value) in headers {
            if is_reserved(name) {
                continue;
            }
            if has_line_break(name) || has_line_break(value) {
                tracing::debug!(header = %name.escape_debug(), "Dropping header containing a line break");
                continue;
            }
            let _ = write!(buf, "{}: {}\r\n", name, value);
        }

        buf.extend_from_slice(b"\r\n");
        if include_body {
            buf.extend_from_slice(body);
        }
        buf
    }
}

fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("date")
}

fn has_line_break(s: &str) -> bool {
    s.contains(|c| c == '\r' || c == '\n')
}
