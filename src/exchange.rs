//! Client conversation over an established session.
//!
//! # Data Flow
//! ```text
//! start url → Connector::connect → Session
//!     for each message: send_text → receive_text → compare
//!     close(Away, reason)
//! ```

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::config::ClientSettings;
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::session::Session;

/// Send `message` and wait for the next text message.
pub async fn echo(session: &mut Session, message: &str) -> Result<String> {
    let sent = session.send_text(message).await?;
    tracing::debug!(bytes = sent, "Sent message");
    let reply = session.receive_text().await?;
    tracing::debug!(bytes = reply.len(), "Received message");
    Ok(reply)
}

/// Outcome of a finished conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub encrypted: bool,
    pub replies: Vec<String>,
}

/// Connect to `start_url`, echo every configured message, then close.
///
/// A reply that differs from what was sent ends the conversation with a
/// protocol error; the session is still closed first.
pub async fn run_chat(connector: &Connector, start_url: &str, settings: &ClientSettings) -> Result<Transcript> {
    let mut session = connector.connect(start_url).await?;
    let encrypted = session.is_encrypted();
    tracing::info!(transport = %session.transport_kind(), "Session established");

    let mut replies = Vec::with_capacity(settings.messages.len());
    let mut mismatch = None;
    for message in &settings.messages {
        let reply = echo(&mut session, message).await?;
        tracing::info!(sent = ?message, received = ?reply, "Echo");
        if reply != *message {
            mismatch = Some(Error::Protocol {
                detail: format!("expected echo of {message:?}, received {reply:?}"),
                source: None,
            });
            break;
        }
        replies.push(reply);
    }

    session.close(CloseCode::Away, &settings.close_reason).await?;
    tracing::info!("Session closed");

    match mismatch {
        Some(err) => Err(err),
        None => Ok(Transcript { encrypted, replies }),
    }
}
