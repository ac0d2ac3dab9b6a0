//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured `tracing` events everywhere, with fields instead of
//!   interpolated strings
//! - Each accepted connection runs inside a span carrying its id

pub mod logging;
