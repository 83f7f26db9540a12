use serde_json::{Map, Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stepforge::core::tools::{HttpRequestTool, InvocationContext, Tool};

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn ctx() -> InvocationContext {
    InvocationContext::new("plan-http", "S1", "fetch")
}

#[tokio::test]
async fn get_returns_status_and_parsed_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"healthy": true})))
        .expect(1)
        .mount(&server)
        .await;

    let result = HttpRequestTool::new(5)
        .execute(
            params(json!({
                "url": format!("{}/v1/status", server.uri()),
                "headers": {"x-trace": "abc"},
            })),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data["status"], 200);
    assert_eq!(result.data["body"]["healthy"], true);
    server.verify().await;
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/items"))
        .and(body_json(json!({"name": "widget", "count": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "item-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = HttpRequestTool::new(5)
        .execute(
            params(json!({
                "url": format!("{}/v1/items", server.uri()),
                "method": "post",
                "body": {"name": "widget", "count": 3},
            })),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data["status"], 201);
    assert_eq!(result.data["body"]["id"], "item-1");
    server.verify().await;
}

#[tokio::test]
async fn query_pairs_are_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .expect(1)
        .mount(&server)
        .await;

    let result = HttpRequestTool::new(5)
        .execute(
            params(json!({
                "url": format!("{}/search", server.uri()),
                "query": {"q": "rust", "page": 2},
            })),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data["body"], "plain text");
    server.verify().await;
}

#[tokio::test]
async fn error_status_fails_but_keeps_the_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&server)
        .await;

    let result = HttpRequestTool::new(5)
        .execute(
            params(json!({"url": format!("{}/missing", server.uri())})),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP 404 Not Found"));
    assert_eq!(result.data["status"], 404);
    assert_eq!(result.data["body"]["error"], "not found");
}

#[tokio::test]
async fn unsupported_method_is_a_soft_failure() {
    let result = HttpRequestTool::new(5)
        .execute(
            params(json!({"url": "http://127.0.0.1:9/x", "method": "DELETE"})),
            &ctx(),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Unsupported HTTP method: DELETE")
    );
}
