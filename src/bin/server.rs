//! HTTP server for the insight-pilot chat session
//! Simple HTTP server using tokio and basic HTTP handling

use insight_pilot::agent_prompts::DEFAULT_TABLE;
use insight_pilot::conversation::{Conversation, SilentObserver, TurnOptions};
use insight_pilot::settings::{AthenaSettings, LlmSettings};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type SharedConversation = Arc<Mutex<Conversation>>;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A client must deliver its whole request within this window.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ChatRequest {
    prompt: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let athena = AthenaSettings::from_env();
    let llm = LlmSettings::from_env();
    info!(
        "Athena region {}, database {}, catalog {}",
        athena.region, athena.database, athena.catalog
    );

    let conversation = Conversation::with_aws(athena, &llm, TurnOptions::default())?;
    let shared: SharedConversation = Arc::new(Mutex::new(conversation));

    let addr = std::env::var("INSIGHT_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("New connection from: {}", peer);
        tokio::spawn(handle_connection(stream, Arc::clone(&shared)));
    }
}

async fn handle_connection(mut stream: TcpStream, conversation: SharedConversation) {
    let response = match read_request_within(&mut stream, READ_TIMEOUT).await {
        Ok(Some(request)) => handle_request(&request, &conversation).await,
        Ok(None) => return,
        Err(e) if e.kind() == ErrorKind::TimedOut => {
            warn!("{}, closing connection", e);
            error_response(408, "Request Timeout", "request timeout")
        }
        Err(e) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

async fn read_request_within(stream: &mut TcpStream, limit: Duration) -> std::io::Result<Option<String>> {
    match tokio::time::timeout(limit, read_request(stream)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            ErrorKind::TimedOut,
            format!("request not received within {:?}", limit),
        )),
    }
}

/// Read the head, then keep reading until `Content-Length` bytes of body arrived.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut data: Vec<u8> = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let size = stream.read(&mut buffer).await?;
        if size == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..size]);

        if let Some(head_end) = find_head_end(&data) {
            let head = String::from_utf8_lossy(&data[..head_end]);
            let expected = content_length(&head).min(MAX_BODY_BYTES);
            if data.len() >= head_end + 4 + expected {
                break;
            }
        }
        if data.len() > MAX_BODY_BYTES + 16 * 1024 {
            warn!("Request exceeds {} bytes, truncating", MAX_BODY_BYTES);
            break;
        }
    }

    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&data).into_owned()))
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn handle_request(request: &str, conversation: &SharedConversation) -> String {
    let lines: Vec<&str> = request.lines().collect();
    if lines.is_empty() {
        return create_response(400, "Bad Request", "{}");
    }

    let parts: Vec<&str> = lines[0].split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let mut path = parts[1].split('?').next().unwrap_or("/").trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    info!("Request: {} {}", method, path);

    let mut headers = HashMap::new();
    for line in &lines[1..] {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let body = request
        .find("\r\n\r\n")
        .map(|start| request[start + 4..].trim())
        .unwrap_or("");

    match (method, path.as_str()) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/api/health") => {
            create_response(200, "OK", r#"{"status":"ok","service":"insight-pilot"}"#)
        }
        ("GET", "/api/schema") => {
            let client = conversation.lock().await.client();
            match client.get_table_schema(DEFAULT_TABLE, None, None, None).await {
                Ok(schema) => create_response(
                    200,
                    "OK",
                    &json!({"table": DEFAULT_TABLE, "columns": schema}).to_string(),
                ),
                Err(e) => error_response(502, "Bad Gateway", &e.to_string()),
            }
        }
        ("GET", "/api/history") => {
            let conversation = conversation.lock().await;
            match serde_json::to_string(&json!({"messages": conversation.history()})) {
                Ok(json) => create_response(200, "OK", &json),
                Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
            }
        }
        ("POST", "/api/chat") => {
            if let Some(content_type) = headers.get("content-type") {
                if !content_type.starts_with("application/json") {
                    warn!("Unexpected content type: {}", content_type);
                }
            }
            let request: ChatRequest = match serde_json::from_str(body) {
                Ok(request) => request,
                Err(e) => return error_response(400, "Bad Request", &format!("Invalid JSON body: {}", e)),
            };
            if request.prompt.trim().is_empty() {
                return error_response(400, "Bad Request", "prompt is required");
            }

            let mut conversation = conversation.lock().await;
            let reply = conversation.submit(request.prompt.trim(), &SilentObserver).await;
            match serde_json::to_string(&reply) {
                Ok(json) => create_response(200, "OK", &json),
                Err(e) => error_response(500, "Internal Server Error", &e.to_string()),
            }
        }
        ("POST", "/api/reset") => {
            conversation.lock().await.reset();
            create_response(200, "OK", r#"{"status":"reset"}"#)
        }
        _ => error_response(404, "Not Found", &format!("No route for {} {}", method, path)),
    }
}

fn error_response(status: u16, status_text: &str, message: &str) -> String {
    create_response(status, status_text, &json!({"error": message}).to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
