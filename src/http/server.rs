//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (CORS, request ID, tracing, timeouts)
//! - Own the relay and its session registry
//! - Apply configuration reloads to new requests and sessions
//! - Shut down: stop accepting, close live sessions, drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::GatewayConfig;
use crate::http::{api, websocket};
use crate::lifecycle::Shutdown;
use crate::relay::{relay_target, AddressError, Relay, RelaySettings, SessionRegistry, WsDialer};

/// Settings that may change on config reload.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    /// WebSocket URL dialed for each new relay session.
    pub relay_target: Url,
    /// Completion endpoint for `/api/llm`.
    pub llm_url: String,
    pub request_timeout: Duration,
    pub max_message_bytes: usize,
}

impl RuntimeState {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, AddressError> {
        let relay_target = relay_target(&config.upstream.base_url, &config.upstream.relay_path)?;
        let llm_url = format!(
            "{}{}",
            config.upstream.base_url.trim().trim_end_matches('/'),
            config.upstream.llm_path
        );

        Ok(Self {
            relay_target,
            llm_url,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            max_message_bytes: config.relay.max_message_bytes,
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<RuntimeState>>,
    pub relay: Arc<Relay<WsDialer>>,
    pub client: reqwest::Client,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
    sessions: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, AddressError> {
        let runtime = RuntimeState::from_config(&config)?;

        let sessions = Shutdown::new();
        let dialer = WsDialer::new(Duration::from_secs(config.upstream.connect_timeout_secs));
        let relay = Relay::new(
            dialer,
            SessionRegistry::new(config.listener.max_sessions),
            sessions.clone(),
            RelaySettings {
                close_grace: Duration::from_millis(config.relay.close_grace_ms),
            },
        );

        let state = AppState {
            inner: Arc::new(ArcSwap::from_pointee(runtime)),
            relay: Arc::new(relay),
            client: reqwest::Client::new(),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
            sessions,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/api/hello", get(api::hello))
            .route("/api/llm", post(api::llm))
            .route("/api/sessions", get(websocket::list_sessions))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers([header::CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

        Router::new()
            .route("/api/ws/chat", get(websocket::chat))
            .merge(api)
            .with_state(state)
            .layer(cors)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener, until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let runtime = self.state.inner.load_full();
        tracing::info!(
            address = %addr,
            upstream = %runtime.relay_target,
            "HTTP server starting"
        );

        let inner = Arc::clone(&self.state.inner);
        let reload = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                match RuntimeState::from_config(&new_config) {
                    Ok(runtime) => {
                        tracing::info!(upstream = %runtime.relay_target, "Configuration reloaded");
                        inner.store(Arc::new(runtime));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded configuration rejected; keeping current");
                    }
                }
            }
        });

        let sessions = self.sessions.clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Stopping listener and closing relay sessions");
                sessions.trigger();
            })
            .await?;

        let deadline = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let remaining = self.state.relay.registry().drain(deadline).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Relay sessions still open at shutdown deadline");
        }
        reload.abort();

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
