//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting
//!             → live relay sessions send going-away and close
//!             → registry drained (bounded wait) → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator; every long-running task subscribes
//! - The same primitive halts the surviving half of a relay session
//! - Shutdown has a deadline: sessions still open after it are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
