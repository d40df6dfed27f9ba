//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::post, Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use chat_gateway::config::GatewayConfig;
use chat_gateway::http::api::{LlmRequest, LlmResponse};
use chat_gateway::{HttpServer, Shutdown};

/// What the mock upstream saw on one of its connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    Connected,
    Text(String),
    Binary(Vec<u8>),
    /// Close frame received; `None` when it carried no code.
    Closed(Option<u16>),
    /// Stream ended or failed without a close frame.
    Dropped,
}

/// How the mock upstream behaves on each connection.
#[derive(Debug, Clone)]
pub enum UpstreamMode {
    /// Echo every data message back.
    Echo,
    /// Record data messages without answering.
    Sink,
    /// Send these messages, then close normally.
    SendThenClose(Vec<String>),
}

/// Start a mock upstream WebSocket server on an ephemeral port.
pub async fn start_ws_upstream(mode: UpstreamMode) -> (SocketAddr, mpsc::UnboundedReceiver<UpstreamEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let events = events_tx.clone();
            let mode = mode.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let _ = events.send(UpstreamEvent::Connected);

                if let UpstreamMode::SendThenClose(messages) = &mode {
                    for text in messages {
                        let _ = ws.send(Message::Text(text.clone().into())).await;
                    }
                    let _ = ws.close(None).await;
                }

                loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => {
                            let _ = events.send(UpstreamEvent::Text(text.to_string()));
                            if matches!(mode, UpstreamMode::Echo) {
                                let _ = ws.send(Message::Text(text)).await;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let _ = events.send(UpstreamEvent::Binary(bytes.to_vec()));
                            if matches!(mode, UpstreamMode::Echo) {
                                let _ = ws.send(Message::Binary(bytes)).await;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let _ = events.send(UpstreamEvent::Closed(frame.map(|f| u16::from(f.code))));
                            // Drain so tungstenite can finish the handshake.
                            while let Some(Ok(_)) = ws.next().await {}
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => {
                            if !matches!(mode, UpstreamMode::SendThenClose(_)) {
                                let _ = events.send(UpstreamEvent::Dropped);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    (addr, events_rx)
}

/// Start a mock completion backend answering `POST /llm` with an echo.
pub async fn start_llm_backend() -> SocketAddr {
    let app = Router::new().route(
        "/llm",
        post(|Json(request): Json<LlmRequest>| async move {
            Json(LlmResponse {
                reply: format!("echo: {}", request.prompt),
                error: None,
            })
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a completion backend whose `/llm` answers with a non-JSON body.
pub async fn start_broken_llm_backend() -> SocketAddr {
    let app = Router::new().route("/llm", post(|| async { "Internal Server Error: model crashed" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Gateway configuration pointing at `upstream`.
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.connect_timeout_secs = 2;
    config.relay.close_grace_ms = 500;
    config.timeouts.request_secs = 5;
    config.timeouts.shutdown_secs = 2;
    config
}

/// A running gateway.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: tokio::task::JoinHandle<()>,
}

impl Gateway {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/ws/chat", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    let handle = tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    Gateway { addr, shutdown, handle }
}

/// Wait for the next upstream event, failing the test after a few seconds.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<UpstreamEvent>) -> UpstreamEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for upstream")
        .expect("upstream event channel closed")
}

/// A port with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
