//! Chat gateway library.
//!
//! Public API gateway in front of the chat backend: one-shot JSON endpoints
//! plus a full-duplex WebSocket relay to the backend's chat stream.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::{Connection, Relay};
