//! WebSocket client that follows HTTP redirects across plain and TLS
//! transports, plus the responder used to exercise it.

pub mod config;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod responder;
pub mod session;

pub use config::AppConfig;
pub use connector::{connect, Connector, RedirectChain, DEFAULT_REDIRECT_LIMIT};
pub use endpoint::{Endpoint, TransportKind};
pub use error::{Error, Report, Result};
pub use exchange::{echo, run_chat, Transcript};
pub use lifecycle::Shutdown;
pub use responder::Responder;
pub use session::Session;
