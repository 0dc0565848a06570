use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{display, parse_typed_config, seconds};
use crate::{Context, ExecutableTask, TaskError};

fn default_method() -> String {
    "GET".into()
}

fn default_timeout() -> f64 {
    30.0
}

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: Option<String>,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    data: Value,
    #[serde(default = "default_timeout")]
    timeout: f64,
}

/// Issue an HTTP request and capture the response.
///
/// Result shape: `{status_code, headers, body, json?}` where `json` is only
/// present when the body parses as JSON. Non-2xx statuses are not failures.
pub struct HttpTask {
    name: String,
    config: Value,
    client: Client,
}

impl HttpTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
            client: Client::new(),
        }
    }
}

fn request_error(e: reqwest::Error) -> TaskError {
    if e.is_timeout() {
        TaskError::Timeout(format!("request timed out: {e}"))
    } else {
        TaskError::execution(format!("request failed: {e}"))
    }
}

#[async_trait]
impl ExecutableTask for HttpTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: HttpConfig = parse_typed_config(&self.config, ctx, &["data", "timeout"])?;
        let url = config.url.ok_or_else(|| TaskError::missing("url"))?;
        let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TaskError::configuration(format!("invalid method: {}", config.method)))?;

        let query: Vec<(String, String)> = config
            .params
            .iter()
            .map(|(k, v)| (k.clone(), display(v)))
            .collect();

        let mut request = self
            .client
            .request(method.clone(), &url)
            .query(&query)
            .timeout(seconds(config.timeout, "timeout")?);
        for (key, value) in &config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        request = match config.data {
            Value::Null => request,
            Value::String(body) => request.body(body),
            data @ (Value::Object(_) | Value::Array(_)) => request.json(&data),
            other => request.body(other.to_string()),
        };

        debug!(task = %self.name, %method, url = %url, "sending request");
        let response = request.send().await.map_err(request_error)?;

        let status = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_owned(), Value::String(v.to_owned())))
            })
            .collect();
        let body = response.text().await.map_err(request_error)?;

        let mut result = json!({
            "status_code": status,
            "headers": headers,
            "body": body,
        });
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            result["json"] = parsed;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn one_shot_server(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn captures_status_body_and_json() {
        let (base, server) = one_shot_server(r#"{"posts":[1,2]}"#).await;
        let task = HttpTask::new("fetch", json!({
            "url": format!("{base}/posts"),
            "params": { "page": "${page}" },
        }));
        let ctx: Context = json!({ "page": 2 }).as_object().cloned().unwrap();

        let out = task.execute(&ctx).await.unwrap();
        assert_eq!(out["status_code"], 200);
        assert_eq!(out["body"], r#"{"posts":[1,2]}"#);
        assert_eq!(out["json"]["posts"], json!([1, 2]));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /posts?page=2 "));
    }

    #[tokio::test]
    async fn numeric_references_render_into_headers_and_keep_type_in_body() {
        let (base, server) = one_shot_server("{}").await;
        let task = HttpTask::new("post", json!({
            "url": base,
            "method": "post",
            "headers": { "X-Attempt": "${attempt}" },
            "data": "${payload}",
        }));
        let ctx: Context = json!({ "attempt": 3, "payload": { "id": 7 } })
            .as_object()
            .cloned()
            .unwrap();

        let out = task.execute(&ctx).await.unwrap();
        assert_eq!(out["status_code"], 200);

        let request = server.await.unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("POST / "));
        assert!(lowered.contains("x-attempt: 3\r\n"), "{request}");
        assert!(lowered.contains("content-type: application/json"), "{request}");
    }

    #[tokio::test]
    async fn url_is_required() {
        let task = HttpTask::new("fetch", json!({ "method": "POST" }));
        assert_eq!(task.execute(&Context::new()).await.unwrap_err(), TaskError::missing("url"));
    }

    #[tokio::test]
    async fn invalid_method_is_a_configuration_error() {
        let task = HttpTask::new("fetch", json!({ "url": "http://localhost", "method": "NOT A METHOD" }));
        assert!(matches!(
            task.execute(&Context::new()).await,
            Err(TaskError::Configuration(_))
        ));
    }
}
