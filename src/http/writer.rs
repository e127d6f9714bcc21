//! Response-writing adapter handed to handlers.

use std::fmt;

use bytes::BytesMut;
use http::StatusCode;

use crate::http::response::{ComposedResponse, ResponseComposer};
use crate::pool::Pooled;

/// Collects a handler's status, headers and body, then composes the response.
///
/// Defaults to `200 OK` with an empty body.
pub struct ResponseWriter {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Pooled<BytesMut>,
}

impl ResponseWriter {
    /// Create a writer whose body accumulates in `body`.
    pub fn new(body: Pooled<BytesMut>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body,
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set a header, replacing any earlier value for the same name (case-insensitive).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Append bytes to the body. Returns the number of bytes written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.body.extend_from_slice(bytes);
        bytes.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Compose the final response. The body buffer goes back to its pool here.
    pub fn finish(self, composer: &ResponseComposer, head_only: bool) -> ComposedResponse {
        composer.compose(self.status, &self.headers, &self.body, !head_only)
    }
}

impl fmt::Write for ResponseWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.body.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}
