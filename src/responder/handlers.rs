//! HTTP handlers for the two responder endpoints.
//!
//! # Responsibilities
//! - Plaintext: bounce chain targets to the TLS endpoint, 404 the rest
//! - TLS: reject non-upgrades, walk the index down, accept at zero
//! - Echo every data message on an accepted session
//!
//! # Design Decisions
//! - Redirect and error responses ask for `Connection: close`, so each hop
//!   costs the client a fresh connection
//! - Echo errors stay inside the upgraded task

use std::sync::Arc;

use axum::{
    body::Body,
    extract::ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

use tracing::Instrument;

use crate::net::ConnectionTracker;
use crate::responder::chain::ChainTarget;

/// Shared, read-only handler state.
#[derive(Debug, Clone)]
pub struct ChainState {
    /// `wss://host:port` of the TLS listener.
    pub secure_root: Arc<str>,
    pub prefix: Arc<str>,
    /// Upgraded sessions outlive their HTTP connection and hold their own guard.
    pub tracker: ConnectionTracker,
}

/// Router for the plaintext listener.
pub fn plain_router(state: ChainState) -> Router {
    Router::new().fallback(redirect_to_secure).with_state(state)
}

/// Router for the TLS listener.
pub fn secure_router(state: ChainState) -> Router {
    Router::new().fallback(descend_or_accept).with_state(state)
}

async fn redirect_to_secure(State(state): State<ChainState>, uri: Uri) -> Response {
    match ChainTarget::parse(uri.path(), &state.prefix) {
        Some(_) => {
            let mut location = format!("{}{}", state.secure_root, uri.path());
            if let Some(query) = uri.query() {
                location.push('?');
                location.push_str(query);
            }
            redirect(location)
        }
        None => refuse(
            StatusCode::NOT_FOUND,
            format!("resource {} is not recognised\r\n", uri),
        ),
    }
}

async fn descend_or_accept(
    State(state): State<ChainState>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(%uri, reason = %rejection, "Not an upgrade request");
            return refuse(
                StatusCode::NOT_ACCEPTABLE,
                "This server only accepts websocket requests\r\n".to_string(),
            );
        }
    };

    let Some(target) = ChainTarget::parse(uri.path(), &state.prefix) else {
        return refuse(StatusCode::NOT_FOUND, format!("try /{}-5\r\n", state.prefix));
    };

    match target.descend() {
        Some(next) => redirect(format!("{}{}", state.secure_root, next.to_path(&state.prefix))),
        None => {
            tracing::info!(%uri, "Accepting upgrade");
            let guard = state.tracker.track();
            let span = tracing::info_span!("session", id = %guard.id());
            upgrade.on_upgrade(move |socket| {
                async move {
                    match echo(socket).await {
                        Ok(echoed) => tracing::info!(echoed, "Echo session finished"),
                        Err(e) => tracing::warn!(error = %e, "Echo session failed"),
                    }
                    drop(guard);
                }
                .instrument(span)
            })
        }
    }
}

/// Send every data message straight back until the peer closes.
/// Returns the number of messages echoed.
pub async fn echo(mut socket: WebSocket) -> Result<u64, axum::Error> {
    let mut echoed = 0;
    while let Some(message) = socket.recv().await {
        match message? {
            message @ (Message::Text(_) | Message::Binary(_)) => {
                socket.send(message).await?;
                echoed += 1;
            }
            // Keep reading after Close so the reply gets flushed.
            Message::Close(frame) => tracing::debug!(?frame, "Peer closing"),
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    Ok(echoed)
}

fn redirect(location: String) -> Response {
    tracing::debug!(%location, "Redirecting");
    let body = format!("please redirect to {location}\r\n");
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, location), (header::CONNECTION, "close".to_string())],
        Body::from(body),
    )
        .into_response()
}

fn refuse(status: StatusCode, message: String) -> Response {
    tracing::debug!(%status, "Refusing request");
    (status, [(header::CONNECTION, "close")], message).into_response()
}
