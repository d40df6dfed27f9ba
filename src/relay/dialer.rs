//! Upstream dialing.

use std::future::Future;
use std::sync::{Mutex, Once};
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url::Url;

use crate::relay::address::AddressError;
use crate::relay::connection::{Connection, Side};

/// Why an upstream connection could not be established.
#[derive(Debug, Error)]
pub enum DialError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("upstream handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream refused: {0}")]
    Refused(String),
}

/// Establishes the upstream half of a relay session.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, target: &Url) -> impl Future<Output = Result<Connection, DialError>> + Send;
}

/// Dials upstream WebSocket endpoints with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsDialer {
    connect_timeout: Duration,
}

impl WsDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        install_crypto_provider();
        Self { connect_timeout }
    }
}

/// `wss` upstreams need a process-wide rustls provider.
fn install_crypto_provider() {
    static INIT_CRYPTO: Once = Once::new();
    INIT_CRYPTO.call_once(|| {
        // Err means an embedder already installed one.
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

impl Default for WsDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Dialer for WsDialer {
    async fn dial(&self, target: &Url) -> Result<Connection, DialError> {
        let connect = tokio_tungstenite::connect_async(target.as_str());
        let (socket, response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| DialError::Timeout(self.connect_timeout))??;

        tracing::debug!(
            target = %target,
            status = %response.status(),
            "Upstream handshake complete"
        );

        Ok(Connection::from_tungstenite(Side::Upstream, socket))
    }
}

/// Hands out pre-built connections in order; fails once they run out.
///
/// Used to wire in-memory sessions in tests and embedders.
#[derive(Debug, Default)]
pub struct StaticDialer {
    connections: Mutex<Vec<Connection>>,
}

impl StaticDialer {
    pub fn new(connections: Vec<Connection>) -> Self {
        let mut connections = connections;
        connections.reverse();
        Self {
            connections: Mutex::new(connections),
        }
    }
}

impl Dialer for StaticDialer {
    async fn dial(&self, target: &Url) -> Result<Connection, DialError> {
        let next = match self.connections.lock() {
            Ok(mut connections) => connections.pop(),
            Err(_) => None,
        };
        next.ok_or_else(|| DialError::Refused(format!("no route to {}", target)))
    }
}
