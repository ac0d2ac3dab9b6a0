//! Accept loops for the plaintext and TLS listeners.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::ResponderConfig;
use crate::endpoint::TransportKind;
use crate::error::{Error, Report, Result};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::responder::handlers::{plain_router, secure_router, ChainState};

/// Both responder endpoints, bound and ready to run.
pub struct Responder {
    plain: Listener,
    secure: Listener,
    acceptor: TlsAcceptor,
    state: ChainState,
    advertised_host: Option<String>,
    tracker: ConnectionTracker,
}

impl Responder {
    /// Bind both listeners.
    pub async fn bind(config: &ResponderConfig, tls: Arc<ServerConfig>) -> std::result::Result<Self, ListenerError> {
        let plain = Listener::bind(&config.plain_address, TransportKind::Plain).await?;
        let secure = Listener::bind(&config.secure_address, TransportKind::Encrypted).await?;

        let advertised_host = config.advertised_host.clone();
        let tracker = ConnectionTracker::new();
        let state = ChainState {
            secure_root: Arc::from(secure.root_url(advertised_host.as_deref())),
            prefix: Arc::from(config.path_prefix.as_str()),
            tracker: tracker.clone(),
        };

        Ok(Self {
            plain,
            secure,
            acceptor: TlsAcceptor::from(tls),
            state,
            advertised_host,
            tracker,
        })
    }

    pub fn plain_addr(&self) -> SocketAddr {
        self.plain.local_addr()
    }

    pub fn secure_addr(&self) -> SocketAddr {
        self.secure.local_addr()
    }

    /// `ws://host:port` of the plaintext listener.
    pub fn plain_root(&self) -> String {
        self.plain.root_url(self.advertised_host.as_deref())
    }

    /// `wss://host:port` of the TLS listener, as sent in redirects.
    pub fn secure_root(&self) -> String {
        self.state.secure_root.to_string()
    }

    /// URL that starts a chain of `index` TLS redirects behind one
    /// plaintext redirect.
    pub fn chain_url(&self, index: u32) -> String {
        format!("{}/{}-{}", self.plain_root(), self.state.prefix, index)
    }

    /// Handle to the in-flight count: HTTP connections plus upgraded echo
    /// sessions.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run both accept loops until `shutdown` fires or a listener fails.
    ///
    /// Handlers still running when the loops stop are left to finish.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> std::result::Result<(), ListenerError> {
        let Self {
            plain,
            secure,
            acceptor,
            state,
            tracker,
            ..
        } = self;

        tracing::info!(
            plain = %plain.local_addr(),
            secure = %secure.local_addr(),
            "Responder starting"
        );

        let plain_router = plain_router(state.clone());
        let plain_loop = accept_loop(plain, shutdown.resubscribe(), tracker.clone(), move |tcp| {
            serve_http(tcp, plain_router.clone())
        });

        let secure_router = secure_router(state);
        let secure_loop = accept_loop(secure, shutdown, tracker.clone(), move |tcp| {
            serve_https(tcp, acceptor.clone(), secure_router.clone())
        });

        let (plain_result, secure_result) = tokio::join!(plain_loop, secure_loop);

        let in_flight = tracker.active_count();
        if in_flight > 0 {
            tracing::info!(in_flight, "Responder stopped accepting, handlers still running");
        } else {
            tracing::info!("Responder stopped");
        }
        plain_result.and(secure_result)
    }
}

async fn accept_loop<F, Fut>(
    listener: Listener,
    mut shutdown: broadcast::Receiver<()>,
    tracker: ConnectionTracker,
    handle: F,
) -> std::result::Result<(), ListenerError>
where
    F: Fn(TcpStream) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let transport = listener.transport();
    loop {
        let (tcp, peer) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(%transport, "Accept loop received shutdown");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) if e.is_transient() => {
                    tracing::warn!(%transport, error = %e, "Transient accept failure");
                    continue;
                }
                Err(e) => {
                    tracing::error!(%transport, error = %e, "Accept loop failed");
                    return Err(e);
                }
            },
        };

        let guard = tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), %peer, %transport);
        let handler = handle(tcp);
        tokio::spawn(
            async move {
                if let Err(e) = handler.await {
                    tracing::warn!(error = %Report(&e), "Connection handler failed");
                }
                drop(guard);
            }
            .instrument(span),
        );
    }
}

async fn serve_http(tcp: TcpStream, router: Router) -> Result<()> {
    serve(tcp, router).await
}

async fn serve_https(tcp: TcpStream, acceptor: TlsAcceptor, router: Router) -> Result<()> {
    let host = tcp
        .local_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default();
    let tls = acceptor
        .accept(tcp)
        .await
        .map_err(|source| Error::EncryptionHandshake { host, source })?;
    serve(tls, router).await
}

/// Serve one HTTP/1.1 connection, allowing a WebSocket upgrade.
async fn serve<S>(stream: S, router: Router) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router))
        .with_upgrades()
        .await?;
    Ok(())
}
