//! Adapter HTTP behaviour against a local responder: auth headers, paths,
//! status mapping and timeouts

use polyglot::config::{ProviderConfig, TimeoutConfig};
use polyglot::llm::{
    build_http_client, AnthropicAdapter, GeminiAdapter, OpenAiAdapter, Provider, ProviderAdapter,
};
use polyglot::ProviderError;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the responder saw
#[derive(Debug)]
struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl CapturedRequest {
    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    fn body_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

enum Reply {
    Respond { status: &'static str, body: String },
    Stall(Duration),
}

/// Accept one connection, record the request and answer it
async fn serve_once(reply: Reply) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let captured = read_request(&mut socket).await;

        match reply {
            Reply::Respond { status, body } => {
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket
                    .write_all(response.as_bytes())
                    .await
                    .expect("write response");
            }
            Reply::Stall(duration) => tokio::time::sleep(duration).await,
        }
        captured
    });

    (format!("http://{}", addr), server)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> CapturedRequest {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buf).await.expect("read request");
        assert!(n > 0, "connection closed before headers were complete");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while raw.len() < body_start + content_length {
        let n = socket.read(&mut buf).await.expect("read body");
        assert!(n > 0, "connection closed before body was complete");
        raw.extend_from_slice(&buf[..n]);
    }

    CapturedRequest {
        request_line,
        headers,
        body: String::from_utf8_lossy(&raw[body_start..body_start + content_length]).to_string(),
    }
}

fn config_for(provider: Provider, endpoint: &str) -> ProviderConfig {
    let mut config = ProviderConfig::default_for(provider);
    config.endpoint = endpoint.to_string();
    config
}

fn client(request_secs: u64) -> reqwest::Client {
    build_http_client(&TimeoutConfig {
        connect_secs: 5,
        request_secs,
    })
    .expect("build client")
}

fn ok(body: &str) -> Reply {
    Reply::Respond {
        status: "200 OK",
        body: body.to_string(),
    }
}

fn rate_limited(body: &str) -> Reply {
    Reply::Respond {
        status: "429 Too Many Requests",
        body: body.to_string(),
    }
}

#[tokio::test]
async fn test_openai_send_uses_bearer_auth() {
    let (endpoint, server) = serve_once(ok(
        r#"{"choices": [{"message": {"role": "assistant", "content": "SYN, SYN-ACK, ACK"}, "finish_reason": "stop"}]}"#,
    ))
    .await;

    let adapter = OpenAiAdapter::new(client(10), config_for(Provider::OpenAi, &endpoint));
    let result = adapter.send("Explain TCP handshakes", "sk-test").await.unwrap();
    assert_eq!(result.text, "SYN, SYN-ACK, ACK");

    let request = server.await.expect("server task completes");
    assert_eq!(request.request_line, "POST /chat/completions HTTP/1.1");
    assert_eq!(request.header_values("authorization"), vec!["Bearer sk-test"]);
    assert_eq!(request.header_values("content-type"), vec!["application/json"]);
    assert!(request.header_values("x-api-key").is_empty());
    assert_eq!(request.body_json()["messages"][0]["content"], "Explain TCP handshakes");
}

#[tokio::test]
async fn test_anthropic_send_uses_api_key_and_version() {
    let (endpoint, server) = serve_once(ok(
        r#"{"content": [{"type": "text", "text": "Three-way handshake."}], "stop_reason": "end_turn", "usage": {"input_tokens": 5, "output_tokens": 3}}"#,
    ))
    .await;

    let adapter = AnthropicAdapter::new(client(10), config_for(Provider::Claude, &endpoint));
    let result = adapter.send("hi", "sk-ant-key").await.unwrap();
    assert_eq!(result.text, "Three-way handshake.");

    let request = server.await.expect("server task completes");
    assert_eq!(request.request_line, "POST /messages HTTP/1.1");
    assert_eq!(request.header_values("x-api-key"), vec!["sk-ant-key"]);
    assert_eq!(request.header_values("anthropic-version"), vec!["2023-06-01"]);
    assert_eq!(request.header_values("content-type"), vec!["application/json"]);
    assert!(request.header_values("authorization").is_empty());
    assert_eq!(request.body_json()["max_tokens"], 1024);
}

#[tokio::test]
async fn test_gemini_send_uses_goog_key_and_model_path() {
    let (endpoint, server) = serve_once(ok(
        r#"{"candidates": [{"content": {"parts": [{"text": "ok"}], "role": "model"}, "finishReason": "STOP"}]}"#,
    ))
    .await;

    let adapter = GeminiAdapter::new(client(10), config_for(Provider::Gemini, &endpoint));
    let result = adapter.send("hello", "AIza-key").await.unwrap();
    assert_eq!(result.text, "ok");

    let request = server.await.expect("server task completes");
    assert_eq!(
        request.request_line,
        "POST /models/gemini-2.5-flash:generateContent HTTP/1.1"
    );
    assert_eq!(request.header_values("x-goog-api-key"), vec!["AIza-key"]);
    assert_eq!(request.header_values("content-type"), vec!["application/json"]);
    assert!(request.header_values("authorization").is_empty());
    assert_eq!(request.body_json()["contents"][0]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn test_openai_rate_limit_maps_to_http_status() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    let (endpoint, server) = serve_once(rate_limited(body)).await;

    let adapter = OpenAiAdapter::new(client(10), config_for(Provider::OpenAi, &endpoint));
    let err = adapter.send("hi", "sk-test").await.unwrap_err();

    assert_eq!(err, ProviderError::HttpStatus(429, body.to_string()));
    assert_eq!(err.reason(), "Rate limit reached");
    server.await.expect("server task completes");
}

#[tokio::test]
async fn test_anthropic_rate_limit_maps_to_http_status() {
    let (endpoint, server) = serve_once(rate_limited("rate limited")).await;

    let adapter = AnthropicAdapter::new(client(10), config_for(Provider::Claude, &endpoint));
    let err = adapter.send("hi", "KEY").await.unwrap_err();

    assert_eq!(err, ProviderError::HttpStatus(429, "rate limited".to_string()));
    assert_eq!(err.reason(), "rate limited");
    server.await.expect("server task completes");
}

#[tokio::test]
async fn test_gemini_rate_limit_maps_to_http_status() {
    let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
    let (endpoint, server) = serve_once(rate_limited(body)).await;

    let adapter = GeminiAdapter::new(client(10), config_for(Provider::Gemini, &endpoint));
    let err = adapter.send("hi", "AIza-key").await.unwrap_err();

    assert_eq!(err, ProviderError::HttpStatus(429, body.to_string()));
    assert_eq!(err.reason(), "Resource has been exhausted");
    server.await.expect("server task completes");
}

#[tokio::test]
async fn test_openai_timeout_maps_to_transport() {
    let (endpoint, server) = serve_once(Reply::Stall(Duration::from_secs(3))).await;

    let adapter = OpenAiAdapter::new(client(1), config_for(Provider::OpenAi, &endpoint));
    let err = adapter.send("hi", "sk-test").await.unwrap_err();

    assert_eq!(err, ProviderError::Transport("request timed out".to_string()));
    server.abort();
}

#[tokio::test]
async fn test_anthropic_timeout_maps_to_transport() {
    let (endpoint, server) = serve_once(Reply::Stall(Duration::from_secs(3))).await;

    let adapter = AnthropicAdapter::new(client(1), config_for(Provider::Claude, &endpoint));
    let err = adapter.send("hi", "KEY").await.unwrap_err();

    assert_eq!(err, ProviderError::Transport("request timed out".to_string()));
    server.abort();
}

#[tokio::test]
async fn test_gemini_timeout_maps_to_transport() {
    let (endpoint, server) = serve_once(Reply::Stall(Duration::from_secs(3))).await;

    let adapter = GeminiAdapter::new(client(1), config_for(Provider::Gemini, &endpoint));
    let err = adapter.send("hi", "AIza-key").await.unwrap_err();

    assert_eq!(err, ProviderError::Transport("request timed out".to_string()));
    server.abort();
}
