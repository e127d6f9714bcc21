//! Per-connection request/response loop.
//!
//! # Responsibilities
//! - Reset the idle deadline before every request
//! - Accumulate reads until one request is framed
//! - Decode, route, run the handler, compose and write the response
//! - Decide whether the connection stays open
//!
//! # Design Decisions
//! - Decode failures answer 400 and keep the connection open
//! - Oversized requests answer 400 and close: the stream cannot be resynchronised
//! - Idle timeouts and transport errors close silently
//! - A panicking handler answers 500; the worker survives
//! - The composed response is dropped (and its buffer released) only after the write

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::http::request::{decode, frame_request, Frame, Request};
use crate::http::response::ResponseComposer;
use crate::http::writer::ResponseWriter;
use crate::net::connection::{Connection, ConnectionState, ReadError};
use crate::observability::metrics;
use crate::pool::{Pools, ScratchReader};
use crate::routing::Router;

/// Everything a connection needs while it is being served. Shared read-only.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub router: Arc<Router>,
    pub pools: Pools,
    pub composer: ResponseComposer,
    pub idle_timeout: Duration,
    pub read_chunk: usize,
    pub max_request_bytes: usize,
}

impl SessionContext {
    pub fn new(config: &ServerConfig, router: Router) -> Self {
        let pools = Pools::new(&config.pools);
        Self {
            router: Arc::new(router),
            composer: ResponseComposer::new(Arc::clone(&pools.buffers)),
            pools,
            idle_timeout: config.timeouts.idle(),
            read_chunk: config.limits.read_chunk_bytes,
            max_request_bytes: config.limits.max_request_bytes,
        }
    }
}

/// Why a connection's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side.
    EndOfStream,
    /// No complete request arrived before the idle deadline.
    IdleTimeout,
    ReadFailed,
    WriteFailed,
    /// The request carried `Connection: close`.
    ClientRequested,
    RequestTooLarge,
}

enum Interrupted {
    Closed(CloseReason),
    TooLarge,
}

/// Serve requests on `conn` until it should close, then close it.
pub async fn serve<S>(conn: &mut Connection<S>, ctx: &SessionContext) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = ctx.pools.readers.acquire();
    let reason = serve_requests(conn, &mut reader, ctx).await;
    conn.close().await;

    tracing::debug!(connection_id = %conn.id(), reason = ?reason, "Connection closed");
    reason
}

async fn serve_requests<S>(
    conn: &mut Connection<S>,
    reader: &mut ScratchReader,
    ctx: &SessionContext,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        conn.set_state(ConnectionState::Idle);
        conn.set_read_deadline(Instant::now() + ctx.idle_timeout);

        let len = match fill_request(conn, reader, ctx.max_request_bytes).await {
            Ok(len) => len,
            Err(Interrupted::Closed(reason)) => return reason,
            Err(Interrupted::TooLarge) => {
                tracing::warn!(
                    connection_id = %conn.id(),
                    buffered = reader.len(),
                    limit = ctx.max_request_bytes,
                    "Request exceeds size limit"
                );
                metrics::record_decode_failure();
                let response = ctx.composer.status(StatusCode::BAD_REQUEST);
                if let Err(e) = conn.write(&response).await {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Failed to write response");
                    return CloseReason::WriteFailed;
                }
                return CloseReason::RequestTooLarge;
            }
        };

        let started = std::time::Instant::now();
        conn.set_state(ConnectionState::Decoding);
        let decoded = decode(&reader.buffered()[..len]);
        reader.consume(len);

        let request = match decoded {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Failed to parse HTTP request");
                metrics::record_decode_failure();
                conn.set_state(ConnectionState::Responding);
                let response = ctx.composer.status(StatusCode::BAD_REQUEST);
                if let Err(e) = conn.write(&response).await {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Failed to write response");
                    return CloseReason::WriteFailed;
                }
                continue;
            }
        };

        let status = match respond(conn, ctx, &request).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Failed to write response");
                return CloseReason::WriteFailed;
            }
        };

        tracing::debug!(
            connection_id = %conn.id(),
            client = %request.client_addr(conn.peer_addr()),
            method = %request.method(),
            path = %request.path(),
            status = status.as_u16(),
            "Request served"
        );
        metrics::record_request(request.method(), status.as_u16(), started);

        if request.wants_close() {
            return CloseReason::ClientRequested;
        }
    }
}

/// Read until `reader` holds one complete request; returns its length.
async fn fill_request<S>(
    conn: &mut Connection<S>,
    reader: &mut ScratchReader,
    max_request_bytes: usize,
) -> Result<usize, Interrupted>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match frame_request(reader.buffered(), max_request_bytes) {
            Frame::Complete(len) => return Ok(len),
            Frame::TooLarge => return Err(Interrupted::TooLarge),
            Frame::Incomplete => {}
        }

        conn.set_state(ConnectionState::Reading);
        match conn.read().await {
            Ok(bytes) => reader.extend(bytes),
            Err(ReadError::EndOfStream) => {
                return Err(Interrupted::Closed(CloseReason::EndOfStream));
            }
            Err(ReadError::TimedOut) => {
                tracing::debug!(connection_id = %conn.id(), "Idle timeout");
                return Err(Interrupted::Closed(CloseReason::IdleTimeout));
            }
            Err(ReadError::Io(e)) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Read failed");
                return Err(Interrupted::Closed(CloseReason::ReadFailed));
            }
        }
    }
}

/// Route the request, write the response, and return its status.
async fn respond<S>(
    conn: &mut Connection<S>,
    ctx: &SessionContext,
    request: &Request,
) -> std::io::Result<StatusCode>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.set_state(ConnectionState::Routing);
    let (status, response) = match ctx.router.find_handler(request.path()) {
        Some(handler) => {
            let mut writer = ResponseWriter::new(ctx.pools.buffers.acquire());
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request, &mut writer)));
            match outcome {
                Ok(()) => (writer.status(), writer.finish(&ctx.composer, request.is_head())),
                Err(_) => {
                    tracing::error!(
                        connection_id = %conn.id(),
                        path = %request.path(),
                        "Handler panicked"
                    );
                    let status = StatusCode::INTERNAL_SERVER_ERROR;
                    (status, ctx.composer.status(status))
                }
            }
        }
        None => {
            let status = StatusCode::NOT_FOUND;
            (status, ctx.composer.status(status))
        }
    };

    conn.set_state(ConnectionState::Responding);
    conn.write(&response).await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn context(idle: Duration) -> SessionContext {
        let router = Router::new()
            .route("/health", |_: &Request, res: &mut ResponseWriter| {
                res.write(b"ok");
            })
            .route("/echo", |req: &Request, res: &mut ResponseWriter| {
                res.set_header("Content-Type", "application/octet-stream");
                res.write(req.body());
            })
            .route("/panic", |_: &Request, _: &mut ResponseWriter| {
                panic!("handler bug");
            });

        let mut config = ServerConfig::default();
        config.timeouts.idle_ms = idle.as_millis() as u64;
        config.limits.read_chunk_bytes = 16;
        config.limits.max_request_bytes = 256;
        SessionContext::new(&config, router)
    }

    fn start(ctx: SessionContext) -> (DuplexStream, tokio::task::JoinHandle<CloseReason>) {
        let (client, server) = duplex(4096);
        let handle = tokio::spawn(async move {
            let mut conn = Connection::new(
                server,
                ConnectionId::new(),
                "127.0.0.1:40000".parse().unwrap(),
                ctx.read_chunk,
                ctx.idle_timeout,
            );
            serve(&mut conn, &ctx).await
        });
        (client, handle)
    }

    /// Read one response: (status line, body).
    async fn read_response(client: &mut DuplexStream) -> (String, Vec<u8>) {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        while !raw.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).await.unwrap();
            raw.push(byte[0]);
        }
        let head = String::from_utf8(raw).unwrap();
        let length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        let mut body = vec![0u8; length];
        client.read_exact(&mut body).await.unwrap();
        (head.lines().next().unwrap().to_string(), body)
    }

    #[tokio::test]
    async fn routes_registered_path() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        client
            .write_all(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let (status, body) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn unknown_path_is_404_with_empty_body() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        client.write_all(b"GET /missing HTTP/1.1\r\n\r\n").await.unwrap();

        let (status, body) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 404 Not Found");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn bad_request_keeps_connection_open() {
        let (mut client, handle) = start(context(Duration::from_secs(5)));
        client.write_all(b"BADLINE\r\n\r\n").await.unwrap();
        let (status, body) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 400 Bad Request");
        assert!(body.is_empty());

        client
            .write_all(b"GET /health HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let (status, _) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 200 OK");

        assert_eq!(handle.await.unwrap(), CloseReason::ClientRequested);
    }

    #[tokio::test]
    async fn keep_alive_serves_many_requests() {
        let (mut client, handle) = start(context(Duration::from_secs(5)));
        for _ in 0..3 {
            client.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
            let (status, _) = read_response(&mut client).await;
            assert_eq!(status, "HTTP/1.1 200 OK");
        }
        drop(client);
        assert_eq!(handle.await.unwrap(), CloseReason::EndOfStream);
    }

    #[tokio::test]
    async fn body_spanning_several_reads_is_assembled() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        let body = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let head = format!("POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len());

        client.write_all(head.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_all(&body[..10]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_all(&body[10..]).await.unwrap();

        let (status, echoed) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert_eq!(echoed, body);
    }

    #[tokio::test]
    async fn get_with_declared_body_keeps_connection_in_sync() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        client
            .write_all(b"GET /health HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world")
            .await
            .unwrap();
        assert_eq!(read_response(&mut client).await.0, "HTTP/1.1 200 OK");

        client.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(read_response(&mut client).await.0, "HTTP/1.1 200 OK");
    }

    #[tokio::test]
    async fn oversized_request_to_departed_client_is_write_failure() {
        let (mut client, handle) = start(context(Duration::from_secs(5)));
        let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        request.extend(std::iter::repeat(b'a').take(400));
        client.write_all(&request).await.unwrap();
        drop(client);

        assert_eq!(handle.await.unwrap(), CloseReason::WriteFailed);
    }

    #[tokio::test]
    async fn pipelined_bytes_carry_over() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        client
            .write_all(b"GET /health HTTP/1.1\r\n\r\nGET /missing HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        assert_eq!(read_response(&mut client).await.0, "HTTP/1.1 200 OK");
        assert_eq!(read_response(&mut client).await.0, "HTTP/1.1 404 Not Found");
    }

    #[tokio::test]
    async fn head_request_gets_length_without_body() {
        let (mut client, handle) = start(context(Duration::from_secs(5)));
        client
            .write_all(b"HEAD /health HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert_eq!(handle.await.unwrap(), CloseReason::ClientRequested);
    }

    #[tokio::test]
    async fn idle_connection_closes_without_response() {
        let (mut client, handle) = start(context(Duration::from_millis(100)));

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        assert!(raw.is_empty());
        assert_eq!(handle.await.unwrap(), CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_and_closed() {
        let (mut client, handle) = start(context(Duration::from_secs(5)));
        let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        request.extend(std::iter::repeat(b'a').take(400));
        client.write_all(&request).await.unwrap();

        let (status, _) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 400 Bad Request");
        assert_eq!(handle.await.unwrap(), CloseReason::RequestTooLarge);
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let (mut client, _handle) = start(context(Duration::from_secs(5)));
        client.write_all(b"GET /panic HTTP/1.1\r\n\r\n").await.unwrap();
        let (status, _) = read_response(&mut client).await;
        assert_eq!(status, "HTTP/1.1 500 Internal Server Error");

        client.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(read_response(&mut client).await.0, "HTTP/1.1 200 OK");
    }

    #[tokio::test]
    async fn scratch_objects_return_to_pools() {
        let ctx = context(Duration::from_secs(5));
        let pools = ctx.pools.clone();
        let (mut client, handle) = start(ctx);

        client
            .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc")
            .await
            .unwrap();
        read_response(&mut client).await;
        handle.await.unwrap();

        assert_eq!(pools.readers.idle_count(), 1);
        assert!(pools.buffers.idle_count() >= 1);
    }
}
