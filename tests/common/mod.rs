//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, pki_types::ServerName, RootCertStore};
use tokio_rustls::TlsConnector;

use https_server::http::ServerError;
use https_server::net::{tls_acceptor_from_pem, ConnectionTracker, Listener};
use https_server::{Request, ResponseWriter, Router, Server, ServerConfig, Shutdown};

/// A server running on an ephemeral port with a client that trusts it.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ServerError>>,
    connector: TlsConnector,
}

#[allow(dead_code)]
impl TestServer {
    /// Open a TCP connection without starting TLS.
    pub async fn connect_tcp(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Run the client side of the TLS handshake over `tcp`.
    pub async fn upgrade(&self, tcp: TcpStream) -> TlsStream<TcpStream> {
        let name = ServerName::try_from("localhost").unwrap();
        self.connector.connect(name, tcp).await.unwrap()
    }

    pub async fn connect(&self) -> TlsStream<TcpStream> {
        let tcp = self.connect_tcp().await;
        self.upgrade(tcp).await
    }
}

/// Routes used across the integration tests.
pub fn test_router() -> Router {
    Router::new()
        .route("/health", |_: &Request, res: &mut ResponseWriter| {
            res.set_header("Content-Type", "text/plain");
            res.write(b"ok");
        })
        .route("/echo", |req: &Request, res: &mut ResponseWriter| {
            res.write(req.body());
        })
}

/// Start a server on `127.0.0.1:0` with a fresh self-signed certificate.
pub async fn start_server(mut config: ServerConfig, router: Router) -> TestServer {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let acceptor = tls_acceptor_from_pem(
        certified.cert.pem().as_bytes(),
        certified.key_pair.serialize_pem().as_bytes(),
    )
    .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(certified.cert.der().clone()).unwrap();
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut client_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    client_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = Listener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr();

    let server = Server::new(&config, acceptor, router, "test").unwrap();
    let tracker = server.tracker();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer {
        addr,
        tracker,
        shutdown,
        handle,
        connector: TlsConnector::from(Arc::new(client_config)),
    }
}

/// A response read off the wire.
#[derive(Debug)]
pub struct TestResponse {
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn status(&self) -> u16 {
        self.status_line
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub async fn send<S: AsyncWrite + Unpin>(stream: &mut S, raw: &[u8]) {
    stream.write_all(raw).await.unwrap();
    stream.flush().await.unwrap();
}

/// Read exactly one response, framed by its Content-Length.
///
/// Pass `head_only` for responses to HEAD requests.
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S, head_only: bool) -> TestResponse {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        raw.push(byte[0]);
    }

    let head = String::from_utf8(raw).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (key, value) = line.split_once(": ").unwrap();
            (key.to_string(), value.to_string())
        })
        .collect();

    let length: usize = headers
        .iter()
        .find(|(key, _)| key == "Content-Length")
        .map(|(_, value)| value.parse().unwrap())
        .unwrap();
    let mut body = vec![0u8; if head_only { 0 } else { length }];
    stream.read_exact(&mut body).await.unwrap();

    TestResponse {
        status_line,
        headers,
        body,
    }
}

/// True once the peer has closed: the next read yields no bytes.
#[allow(dead_code)]
pub async fn is_closed<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = [0u8; 64];
    matches!(stream.read(&mut buf).await, Ok(0) | Err(_))
}
