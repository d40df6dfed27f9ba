//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse, then PY_SERVICE_URL / GATEWAY_BIND_ADDRESS overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → HttpServer swaps its runtime state (new sessions see the new upstream)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults; the gateway runs with no file at all
//! - Environment wins over the file
//! - Live relay sessions keep the upstream they dialed

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{GatewayConfig, ListenerConfig, ObservabilityConfig, RelayConfig, TimeoutConfig, UpstreamConfig};
pub use watcher::ConfigWatcher;
