use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;

async fn llm(Json(body): Json<Value>) -> Json<Value> {
    let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or_default();
    Json(json!({ "reply": format!("You said: {}", prompt) }))
}

async fn chat(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let reply = match message {
            Message::Text(text) => Message::Text(format!("echo: {}", text.as_str()).into()),
            Message::Binary(bytes) => Message::Binary(bytes),
            Message::Close(_) => break,
            _ => continue,
        };
        if socket.send(reply).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() {
    let app = Router::new()
        .route("/llm", post(llm))
        .route("/ws/chat", get(chat));

    let addr = SocketAddr::from(([127, 0, 0, 1], 8000));
    println!("Pretend chat backend is listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
