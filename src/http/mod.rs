//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, CORS, request ID, tracing, timeouts)
//!     → api.rs        GET /api/hello, POST /api/llm (one-shot JSON)
//!     → websocket.rs  GET /api/ws/chat (upgrade → relay session)
//!                     GET /api/sessions (live relay sessions)
//! ```

pub mod api;
pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer, RuntimeState};
