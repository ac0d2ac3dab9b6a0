//! Test responder that produces a redirect chain.
//!
//! # Data Flow
//! ```text
//! ws://  listener → plain handler  → 301 wss://…/<prefix>-N     (or 404)
//! wss:// listener → TLS handshake  → secure handler
//!     not an upgrade      → 406
//!     no chain target     → 404
//!     index N > 0         → 301 wss://…/<prefix>-(N-1)
//!     index 0             → 101, echo loop
//! ```
//!
//! # Design Decisions
//! - The listener a connection arrives on decides its transport
//! - One task per connection, no shared mutable state between them
//! - A failing connection is logged and never stops its accept loop

pub mod chain;
pub mod handlers;
pub mod server;

pub use chain::ChainTarget;
pub use server::Responder;
