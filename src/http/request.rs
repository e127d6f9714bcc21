//! Request decoding and framing.
//!
//! # Responsibilities
//! - Decide when enough bytes have arrived to form one request
//! - Decode a byte span into a [`Request`]
//! - Derive the client address for logging
//!
//! # Design Decisions
//! - Lenient header parsing: lines without `": "` are skipped
//! - Repeated header keys: the last value wins
//! - A valid `Content-Length` frames the body for every method; without it,
//!   GET/HEAD carry no body and other methods take whatever is buffered
//! - The decoder performs no I/O

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

const LINE_END: &str = "\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";
const HEADER_SEPARATOR: &str = ": ";

/// Why a byte span could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Request head is not valid UTF-8.
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    /// Request line is not exactly `<method> <path> <version>`.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
}

/// A decoded HTTP/1.1 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Headers exactly as received (keys keep their case).
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header, exact key first, then case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value);
        }
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// True when the client asked for the connection to end after this response.
    pub fn wants_close(&self) -> bool {
        self.header("Connection")
            .map(|value| value.trim().eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }

    /// Client address for observability only.
    ///
    /// First token of `X-Forwarded-For`, then `X-Real-IP`, then the peer IP.
    pub fn client_addr(&self, peer_addr: SocketAddr) -> String {
        if let Some(forwarded) = self.header("X-Forwarded-For").filter(|v| !v.is_empty()) {
            if let Some(first) = forwarded.split(',').next() {
                return first.trim().to_string();
            }
        }

        if let Some(real_ip) = self.header("X-Real-IP").filter(|v| !v.is_empty()) {
            return real_ip.trim().to_string();
        }

        peer_addr.ip().to_string()
    }
}

/// Outcome of looking for one complete request in buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// More bytes are needed.
    Incomplete,
    /// The first `len` bytes hold one request.
    Complete(usize),
    /// The request cannot fit within the size limit.
    TooLarge,
}

/// Find the extent of the first request in `buf`.
pub fn frame_request(buf: &[u8], max_len: usize) -> Frame {
    let head_len = match find_head_end(buf) {
        Some(pos) => pos + HEAD_END.len(),
        None if buf.len() >= max_len => return Frame::TooLarge,
        None => return Frame::Incomplete,
    };
    if head_len > max_len {
        return Frame::TooLarge;
    }

    let head = &buf[..head_len];
    let body_len = match content_length(head) {
        Some(Ok(len)) => len,
        // Decoding reports the bad value; frame the head alone.
        Some(Err(())) => 0,
        None if method_has_body(head) => buf.len() - head_len,
        None => 0,
    };

    let total = head_len.saturating_add(body_len);
    if total > max_len {
        Frame::TooLarge
    } else if buf.len() < total {
        Frame::Incomplete
    } else {
        Frame::Complete(total)
    }
}

/// Decode one request from a byte span.
pub fn decode(raw: &[u8]) -> Result<Request, DecodeError> {
    let (head, body) = match find_head_end(raw) {
        Some(pos) => (&raw[..pos], &raw[pos + HEAD_END.len()..]),
        None => (raw, &raw[raw.len()..]),
    };
    let head = std::str::from_utf8(head).map_err(|_| DecodeError::InvalidEncoding)?;

    let mut lines = head.split(LINE_END);
    let request_line = lines.next().unwrap_or_default();

    let tokens: Vec<&str> = request_line.split(' ').collect();
    let (method, path, version) = match tokens.as_slice() {
        [method, path, version] if !method.is_empty() && !path.is_empty() && !version.is_empty() => {
            (*method, *path, *version)
        }
        _ => return Err(DecodeError::MalformedRequestLine(request_line.to_string())),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(HEADER_SEPARATOR) {
            headers.insert(key.to_string(), value.to_string());
        }
    }

    if let Some((_, value)) = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
    {
        if value.trim().parse::<usize>().is_err() {
            return Err(DecodeError::InvalidContentLength(value.clone()));
        }
    }

    Ok(Request {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: Bytes::copy_from_slice(body),
    })
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_END.len()).position(|window| window == HEAD_END)
}

fn method_has_body(head: &[u8]) -> bool {
    let method = head.split(|b| *b == b' ').next().unwrap_or_default();
    method != b"GET" && method != b"HEAD"
}

fn content_length(head: &[u8]) -> Option<Result<usize, ()>> {
    let head = std::str::from_utf8(head).ok()?;
    head.split(LINE_END)
        .skip(1)
        .filter_map(|line| line.split_once(HEADER_SEPARATOR))
        .filter(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .last()
        .map(|(_, value)| value.trim().parse::<usize>().map_err(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_line_and_headers() {
        let req = decode(b"GET /health HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n").unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/health");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.header("Host"), Some("x"));
        assert_eq!(req.header("accept"), Some("*/*"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn last_duplicate_header_wins() {
        let req = decode(b"GET / HTTP/1.1\r\nX-Token: one\r\nX-Token: two\r\n\r\n").unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("X-Token"), Some("two"));
    }

    #[test]
    fn lines_without_separator_are_skipped() {
        let req = decode(b"GET / HTTP/1.1\r\nHost: x\r\ngarbage\r\nNoSpace:y\r\n\r\n").unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("Host"), Some("x"));
    }

    #[test]
    fn header_value_keeps_later_separators() {
        let req = decode(b"GET / HTTP/1.1\r\nX-Note: a: b\r\n\r\n").unwrap();
        assert_eq!(req.header("X-Note"), Some("a: b"));
    }

    #[test]
    fn wrong_token_count_fails() {
        for raw in [
            &b"BADLINE\r\n\r\n"[..],
            b"GET /\r\n\r\n",
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET  / HTTP/1.1\r\n\r\n",
            b"\r\n\r\n",
        ] {
            assert!(
                matches!(decode(raw), Err(DecodeError::MalformedRequestLine(_))),
                "{:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn body_is_everything_after_blank_line() {
        let req = decode(b"POST /echo HTTP/1.1\r\nContent-Length: 12\r\n\r\nline1\r\nline2").unwrap();
        assert_eq!(&req.body()[..], b"line1\r\nline2");
    }

    #[test]
    fn head_without_terminator_decodes_leniently() {
        let req = decode(b"GET / HTTP/1.1\r\nHost: x").unwrap();
        assert_eq!(req.header("Host"), Some("x"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn invalid_utf8_and_content_length_fail() {
        assert_eq!(decode(b"GET /\xff HTTP/1.1\r\n\r\n"), Err(DecodeError::InvalidEncoding));
        assert!(matches!(
            decode(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n"),
            Err(DecodeError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn connection_close_is_case_insensitive() {
        let req = decode(b"GET / HTTP/1.1\r\nconnection: Close\r\n\r\n").unwrap();
        assert!(req.wants_close());

        let req = decode(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!req.wants_close());
    }

    #[test]
    fn client_addr_precedence() {
        let peer: SocketAddr = "10.0.0.9:4242".parse().unwrap();

        let req = decode(b"GET / HTTP/1.1\r\nX-Forwarded-For: 1.1.1.1 , 2.2.2.2\r\nX-Real-IP: 3.3.3.3\r\n\r\n").unwrap();
        assert_eq!(req.client_addr(peer), "1.1.1.1");

        let req = decode(b"GET / HTTP/1.1\r\nX-Real-IP:  3.3.3.3 \r\n\r\n").unwrap();
        assert_eq!(req.client_addr(peer), "3.3.3.3");

        let req = decode(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.client_addr(peer), "10.0.0.9");
    }

    #[test]
    fn framing_get_stops_at_head() {
        let buf = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET /next HTTP/1.1\r\n";
        assert_eq!(frame_request(buf, 1024), Frame::Complete(27));
        assert_eq!(frame_request(b"GET / HTTP/1.1\r\nHost:", 1024), Frame::Incomplete);
    }

    #[test]
    fn framing_waits_for_content_length() {
        let head = b"POST /echo HTTP/1.1\r\ncontent-length: 5\r\n\r\n";
        let mut buf = head.to_vec();
        buf.extend_from_slice(b"hel");
        assert_eq!(frame_request(&buf, 1024), Frame::Incomplete);

        buf.extend_from_slice(b"lo");
        assert_eq!(frame_request(&buf, 1024), Frame::Complete(head.len() + 5));
    }

    #[test]
    fn framing_get_with_length_consumes_body() {
        let head = b"GET /health HTTP/1.1\r\nContent-Length: 11\r\n\r\n";
        let mut buf = head.to_vec();
        buf.extend_from_slice(b"hello world");
        buf.extend_from_slice(b"GET /health HTTP/1.1\r\n\r\n");
        assert_eq!(frame_request(&buf, 1024), Frame::Complete(head.len() + 11));

        let req = decode(&buf[..head.len() + 11]).unwrap();
        assert_eq!(req.body().as_ref(), b"hello world");
    }

    #[test]
    fn framing_without_length_takes_buffered_body() {
        let buf = b"POST /echo HTTP/1.1\r\n\r\nabc";
        assert_eq!(frame_request(buf, 1024), Frame::Complete(buf.len()));
    }

    #[test]
    fn framing_enforces_limit() {
        assert_eq!(frame_request(&[b'a'; 64], 64), Frame::TooLarge);
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n";
        assert_eq!(frame_request(buf, 64), Frame::TooLarge);
    }

    #[test]
    fn framing_bad_length_frames_head_only() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: x\r\n\r\nbody";
        assert_eq!(frame_request(buf, 1024), Frame::Complete(buf.len() - 4));
    }
}
