//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     client finished or signal received → stop accepting → handlers finish
//!
//! Signals (signals.rs):
//!     Ctrl-C → trigger shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
