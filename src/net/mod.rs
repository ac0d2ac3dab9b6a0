//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, one listener per transport)
//!     → tls.rs (server config for the TLS listener)
//!     → connection.rs (connection id, in-flight tracking)
//!     → Hand off to the responder
//!
//! Outgoing connection
//!     → tls.rs (client trust store)
//!     → connector
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use tls::{PemMaterial, TlsContexts, TrustStore};
