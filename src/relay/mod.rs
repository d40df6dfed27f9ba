//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! accepted client socket
//!     → connection.rs (wrap as Connection: receive / send / close)
//!     → registry.rs (reserve slot, assign session id)
//!     → address.rs (upstream base → ws(s)://host/ws/chat)
//!     → dialer.rs (open upstream Connection)
//!     → session.rs (two forwarding tasks + coordinator)
//!     → both connections closed, SessionReport returned
//!
//! Session States:
//!     Dialing → Forwarding → Draining → Closed
//!     Dialing → Closed (dial failure)
//! ```
//!
//! # Design Decisions
//! - One message in flight per direction; a slow peer only stalls its own direction
//! - No retries: a failed dial or write ends that session only
//! - Messages are never inspected or rewritten

pub mod address;
pub mod connection;
pub mod dialer;
pub mod registry;
pub mod session;

pub use address::{relay_target, AddressError, DEFAULT_RELAY_PATH, DEFAULT_UPSTREAM_BASE};
pub use connection::{duplex, CloseFrame, Closure, Connection, ConnectionError, Frame, MemoryPeer, Message, Received, Side};
pub use dialer::{DialError, Dialer, StaticDialer, WsDialer};
pub use registry::{SessionId, SessionRegistry, SessionSlot, SessionSnapshot, SessionState};
pub use session::{Direction, Relay, RelaySettings, SessionEnd, SessionReport};
