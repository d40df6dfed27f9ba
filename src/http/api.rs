//! Request/response API handlers.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::server::AppState;
use crate::observability::metrics;

#[derive(Debug, Serialize, Deserialize)]
pub struct HelloResponse {
    pub message: String,
}

/// Completion request forwarded to the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    #[serde(default)]
    pub prompt: String,
}

/// Completion response, from the backend or produced by the gateway on error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default)]
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Failures of the completion proxy, each mapped to a status and message.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid json")]
    InvalidJson(#[source] serde_json::Error),

    #[error("python service unavailable")]
    Unavailable(#[source] reqwest::Error),

    #[error("invalid response from python")]
    InvalidResponse(#[source] reqwest::Error),
}

impl LlmError {
    fn status(&self) -> StatusCode {
        match self {
            LlmError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            LlmError::Unavailable(_) | LlmError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let body = LlmResponse {
            reply: String::new(),
            error: Some(self.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// `GET /api/hello`
pub async fn hello() -> Json<HelloResponse> {
    metrics::record_request("hello", 200, Instant::now());
    Json(HelloResponse {
        message: "Hello from gateway".to_string(),
    })
}

/// `POST /api/llm`
pub async fn llm(State(state): State<AppState>, body: Bytes) -> Response {
    let start = Instant::now();
    let response = match forward_completion(&state, &body).await {
        Ok(out) => Json(out).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, source = ?std::error::Error::source(&e), "Completion proxy failed");
            e.into_response()
        }
    };
    metrics::record_request("llm", response.status().as_u16(), start);
    response
}

async fn forward_completion(state: &AppState, body: &[u8]) -> Result<LlmResponse, LlmError> {
    let request: LlmRequest = serde_json::from_slice(body).map_err(LlmError::InvalidJson)?;
    let runtime = state.inner.load_full();

    let upstream = state
        .client
        .post(&runtime.llm_url)
        .timeout(runtime.request_timeout)
        .json(&request)
        .send()
        .await
        .map_err(LlmError::Unavailable)?;

    tracing::debug!(status = %upstream.status(), url = %runtime.llm_url, "Completion answered");

    upstream.json::<LlmResponse>().await.map_err(LlmError::InvalidResponse)
}
