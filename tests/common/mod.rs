//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ws_redirect::config::{ResponderConfig, TlsConfig};
use ws_redirect::net::{ConnectionTracker, ListenerError, TlsContexts};
use ws_redirect::{Connector, Responder, Shutdown};

/// A responder running on ephemeral ports with its own certificate.
pub struct TestResponder {
    pub chain_root: String,
    pub secure_root: String,
    pub tls: TlsContexts,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestResponder {
    /// URL that asks for `index` secure redirects after the plain one.
    pub fn chain_url(&self, index: u32) -> String {
        format!("{}-{}", self.chain_root, index)
    }

    /// A connector trusting this responder's certificate.
    pub fn connector(&self, redirect_limit: u32) -> Connector {
        Connector::new(self.tls.client.clone()).with_redirect_limit(redirect_limit)
    }

    /// Wait until no connection or echo session is in flight.
    pub async fn drained(&self) -> bool {
        for _ in 0..100 {
            if self.tracker.active_count() == 0 {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = self.handle.await.unwrap();
        assert!(result.is_ok());
    }
}

pub fn test_tls() -> TlsContexts {
    let config = TlsConfig {
        native_roots: false,
        ..TlsConfig::default()
    };
    TlsContexts::from_config(&config).unwrap()
}

/// Start a responder on 127.0.0.1 with a freshly generated certificate.
pub async fn start_responder() -> TestResponder {
    start_responder_with(ResponderConfig::default()).await
}

pub async fn start_responder_with(config: ResponderConfig) -> TestResponder {
    let tls = test_tls();
    let responder = Responder::bind(&config, tls.server.clone()).await.unwrap();
    let chain_root = format!("{}/{}", responder.plain_root(), config.path_prefix);
    let secure_root = responder.secure_root();
    let tracker = responder.tracker();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(responder.run(shutdown.subscribe()));

    TestResponder {
        chain_root,
        secure_root,
        tls,
        tracker,
        shutdown,
        handle,
    }
}

/// Raw HTTP response written by a programmable backend.
pub struct MockReply {
    pub status: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl MockReply {
    pub fn new(status: &'static str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn render(&self) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.body.len(),
            self.body
        ));
        out
    }
}

/// Start a backend that answers every request with whatever `f` returns
/// for the listener's own address. Returns the address and a request
/// counter.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let f = Arc::new(f);

    let counter = calls.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let reply = f(addr).await;
                let _ = socket.write_all(reply.render().as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, calls)
}

/// Start a backend that answers every request with `reply`.
pub async fn start_mock_backend(
    status: &'static str,
    headers: Vec<(&'static str, String)>,
) -> (SocketAddr, Arc<AtomicU32>) {
    start_programmable_backend(move |_| {
        let headers = headers.clone();
        async move {
            MockReply {
                status,
                headers,
                body: String::new(),
            }
        }
    })
    .await
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Start a plaintext WebSocket peer that answers the first message of each
/// session with a binary frame, then waits for the peer to close.
pub async fn start_binary_peer() -> SocketAddr {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                if let Some(Ok(_)) = ws.next().await {
                    let _ = ws.send(Message::binary(vec![0xde, 0xad, 0xbe, 0xef])).await;
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    addr
}
