use super::traits::{
    ExecutionContextKind, InvocationContext, ParameterKind, ParameterSpec, Tool, ToolFuture,
    ToolMetadata, ToolResult, action_mentions,
};
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Response bodies beyond this are cut before parsing.
const MAX_BODY_BYTES: usize = 1_048_576;
const HTTP_ACTIONS: &[&str] = &[
    "http", "https", "fetch", "get", "post", "request", "download", "url", "api", "web",
];

pub fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// GET/POST against remote HTTP endpoints.
pub struct HttpRequestTool {
    metadata: ToolMetadata,
    client: Client,
}

impl HttpRequestTool {
    pub fn new(timeout_secs: u64) -> Self {
        let metadata = ToolMetadata::new("http_request", "Send a GET or POST request to a URL")
            .with_capabilities(["network", "http_get", "http_post", "fetch"])
            .with_permissions(["network"])
            .with_context(ExecutionContextKind::Remote)
            .with_parameter(ParameterSpec::required("url", ParameterKind::String, "Absolute http(s) URL"))
            .with_parameter(ParameterSpec::optional("method", ParameterKind::String, "GET (default) or POST"))
            .with_parameter(ParameterSpec::optional("headers", ParameterKind::Object, "Extra request headers"))
            .with_parameter(ParameterSpec::optional("query", ParameterKind::Object, "Query string pairs"))
            .with_parameter(ParameterSpec::optional("body", ParameterKind::Any, "JSON body for POST"))
            .with_timeout_ms(timeout_secs.saturating_mul(1000))
            .with_domain("web");

        Self {
            metadata,
            client: build_http_client(timeout_secs),
        }
    }
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let rendered = value
                        .as_str()
                        .map_or_else(|| value.to_string(), ToString::to_string);
                    (key.clone(), rendered)
                })
                .collect()
        })
        .unwrap_or_default()
}

impl Tool for HttpRequestTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn can_handle(&self, action: &str) -> bool {
        action_mentions(action, HTTP_ACTIONS)
    }

    fn execute<'a>(
        &'a self,
        parameters: Map<String, Value>,
        ctx: &'a InvocationContext,
    ) -> ToolFuture<'a> {
        Box::pin(async move {
            let url = parameters
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing 'url' parameter"))?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Ok(ToolResult::fail(format!("Unsupported URL scheme: {url}")));
            }

            let method = match parameters
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("GET")
                .to_ascii_uppercase()
                .as_str()
            {
                "GET" => Method::GET,
                "POST" => Method::POST,
                other => return Ok(ToolResult::fail(format!("Unsupported HTTP method: {other}"))),
            };

            let mut request = self.client.request(method.clone(), url);
            for (name, value) in string_pairs(parameters.get("headers")) {
                request = request.header(name, value);
            }
            let query = string_pairs(parameters.get("query"));
            if !query.is_empty() {
                request = request.query(&query);
            }
            if method == Method::POST
                && let Some(body) = parameters.get("body")
            {
                request = request.json(body);
            }

            tracing::debug!(step_id = %ctx.step_id, %method, url, "http request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return Ok(ToolResult::fail(format!("HTTP request failed: {e}"))),
            };
            let status = response.status();
            let bytes = response.bytes().await?;
            let slice = &bytes[..bytes.len().min(MAX_BODY_BYTES)];
            let body = serde_json::from_slice::<Value>(slice)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(slice).to_string()));

            let data = json!({
                "status": status.as_u16(),
                "body": body,
            });

            if status.is_success() {
                Ok(ToolResult::ok(data))
            } else {
                Ok(ToolResult {
                    success: false,
                    data,
                    error: Some(format!("HTTP {status}")),
                })
            }
        })
    }
}
