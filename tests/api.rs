//! End-to-end tests for the HTTP endpoints.

mod common;

use common::{start_gateway, start_llm_backend};

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_hello_with_cors_and_request_id() {
    let upstream = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(upstream)).await;

    let response = client()
        .get(gateway.http_url("/api/hello"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"message": "Hello from gateway"}));

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let upstream = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(upstream)).await;

    let response = client()
        .get(gateway.http_url("/api/hello"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me-123");
    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_preflight_allows_post_with_json() {
    let upstream = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(upstream)).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, gateway.http_url("/api/llm"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    let methods = headers
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_uppercase();
    assert!(methods.contains("POST"));
    let allowed = headers
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("content-type"));

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_plain_options_is_answered_by_cors_layer() {
    let upstream = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(upstream)).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, gateway.http_url("/api/hello"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();

    // Never routed: no 405 even though /api/hello only accepts GET.
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    assert!(response.text().await.unwrap().is_empty());

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_llm_proxies_prompt_to_backend() {
    let backend = start_llm_backend().await;
    let gateway = start_gateway(common::gateway_config(backend)).await;

    let response = client()
        .post(gateway.http_url("/api/llm"))
        .json(&serde_json::json!({"prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"reply": "echo: hi"}));

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_llm_rejects_invalid_json() {
    let backend = start_llm_backend().await;
    let gateway = start_gateway(common::gateway_config(backend)).await;

    let response = client()
        .post(gateway.http_url("/api/llm"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid json");
    assert_eq!(body["reply"], "");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_llm_reports_unreachable_backend() {
    let dead = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(dead)).await;

    let response = client()
        .post(gateway.http_url("/api/llm"))
        .json(&serde_json::json!({"prompt": "anyone there?"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "python service unavailable");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_llm_reports_undecodable_backend_reply() {
    let backend = common::start_broken_llm_backend().await;
    let gateway = start_gateway(common::gateway_config(backend)).await;

    let response = client()
        .post(gateway.http_url("/api/llm"))
        .json(&serde_json::json!({"prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"reply": "", "error": "invalid response from python"})
    );

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_sessions_empty_when_idle() {
    let upstream = common::unused_addr().await;
    let gateway = start_gateway(common::gateway_config(upstream)).await;

    let sessions: serde_json::Value = client()
        .get(gateway.http_url("/api/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions, serde_json::json!([]));

    gateway.shutdown.trigger();
}
