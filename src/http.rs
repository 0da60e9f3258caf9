//! HTTP endpoint layer
//!
//! Minimal HTTP handling over tokio TCP, no framework. One spawned task per
//! connection; each request is served start-to-finish with no internal
//! parallelism. Responses always carry a JSON body (except the front-end
//! page) and permissive CORS headers.

use crate::config::Config;
use crate::db::{self, Record};
use crate::error::AskdbError;
use crate::llm::LlmClient;
use crate::translate;
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

const INDEX_PATH: &str = "static/index.html";
const MAX_REQUEST_BYTES: usize = 1 << 20;

/// Success payload for `POST /query`.
#[derive(Debug, Serialize)]
struct QueryResponse {
    sql_query: String,
    results: Vec<Record>,
}

pub struct App {
    config: Config,
    llm: LlmClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let llm = LlmClient::from_config(&config);
        Self { config, llm }
    }

    pub async fn handle_connection(&self, mut stream: TcpStream) {
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to read from stream: {}", e);
                return;
            }
        };

        let response = self.handle_request(&request).await;
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            warn!("Failed to write response: {}", e);
        }
    }

    /// Route one raw HTTP request to a handler and render the response.
    pub async fn handle_request(&self, request: &str) -> String {
        let Some(request_line) = request.lines().next() else {
            return create_response(400, "Bad Request", "{}");
        };

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return create_response(400, "Bad Request", "{}");
        }

        let method = parts[0];
        let mut path = parts[1];
        if let Some(query_start) = path.find('?') {
            path = &path[..query_start];
        }
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };

        info!("Request: {} {}", method, path);

        match (method, path) {
            ("GET", "/") => serve_index(),
            ("POST", "/query") => self.process_query(request).await,
            // CORS preflight
            ("OPTIONS", _) => create_response(200, "OK", ""),
            _ => {
                warn!("404: {} {} not found", method, path);
                let body = serde_json::json!({
                    "error": format!("Endpoint not found: {} {}", method, path)
                });
                create_response(404, "Not Found", &body.to_string())
            }
        }
    }

    /// `POST /query`: translate the English question, execute, return rows.
    async fn process_query(&self, request: &str) -> String {
        let Some(user_query) = extract_query_field(request) else {
            return create_response(400, "Bad Request", r#"{"error":"No query provided"}"#);
        };

        info!("Received query: {}", user_query);

        let translation = translate::translate(&self.config, &self.llm, &user_query).await;
        let Some(sql_query) = translation.into_sql() else {
            return create_response(
                400,
                "Bad Request",
                r#"{"error":"Could not generate a valid SQL query."}"#,
            );
        };

        let mut conn = match db::connect(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("{}", e);
                return create_response(
                    500,
                    "Internal Server Error",
                    r#"{"error":"Database connection failed."}"#,
                );
            }
        };

        let result = db::fetch_rows(&mut conn, &self.config.db_name, &sql_query).await;
        let _ = sqlx::Connection::close(conn).await;

        match result {
            Ok(records) => {
                info!("SQL executed successfully");
                let payload = QueryResponse {
                    sql_query,
                    results: records,
                };
                match serde_json::to_string(&payload) {
                    Ok(body) => create_response(200, "OK", &body),
                    Err(e) => {
                        error!("Failed to serialize response: {}", e);
                        create_response(
                            500,
                            "Internal Server Error",
                            r#"{"error":"Failed to serialize response"}"#,
                        )
                    }
                }
            }
            Err(e) => {
                error!("SQL execution error: {}", e);
                let message = match e {
                    AskdbError::Database(msg) => msg,
                    other => other.to_string(),
                };
                // Observed behavior: execution failures keep the default
                // success status and report the error in the body.
                let body = serde_json::json!({
                    "error": format!("SQL Execution Error: {}", message)
                });
                create_response(200, "OK", &body.to_string())
            }
        }
    }
}

/// Pull the string `query` field out of the request's JSON body.
fn extract_query_field(request: &str) -> Option<String> {
    let body_start = request.find("\r\n\r\n").map(|pos| pos + 4)?;
    let body = request[body_start..].trim();
    let json_start = body.find('{')?;
    let data: serde_json::Value = serde_json::from_str(&body[json_start..]).ok()?;
    data.get("query")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn serve_index() -> String {
    match std::fs::read_to_string(Path::new(INDEX_PATH)) {
        Ok(page) => create_html_response(&page),
        Err(e) => {
            warn!("Failed to read {}: {}", INDEX_PATH, e);
            create_response(404, "Not Found", r#"{"error":"index.html not found"}"#)
        }
    }
}

/// Read a full HTTP request: headers, then as many body bytes as
/// Content-Length announces. A single read is not enough for POST bodies
/// split across TCP segments.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = find_header_end(&buffer) {
            let headers = String::from_utf8_lossy(&buffer[..header_end]);
            let expected = header_end + 4 + content_length(&headers);
            if buffer.len() >= expected {
                break;
            }
        }

        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

fn create_html_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        App::new(Config {
            db_host: "localhost".to_string(),
            db_port: 3306,
            db_user: "root".to_string(),
            db_password: String::new(),
            db_name: "askdb".to_string(),
            llm_api_key: None,
            llm_base_url: "http://127.0.0.1:9".to_string(),
        })
    }

    fn post(body: &str) -> String {
        format!(
            "POST /query HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[tokio::test]
    async fn missing_query_field_is_rejected() {
        let response = test_app().handle_request(&post("{}")).await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("No query provided"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let response = test_app().handle_request(&post("not json")).await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("No query provided"));
    }

    #[tokio::test]
    async fn non_string_query_is_rejected() {
        let response = test_app().handle_request(&post(r#"{"query": 42}"#)).await;
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = test_app()
            .handle_request("GET /nope HTTP/1.1\r\n\r\n")
            .await;
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.contains("Endpoint not found"));
    }

    #[tokio::test]
    async fn options_preflight_is_accepted() {
        let response = test_app()
            .handle_request("OPTIONS /query HTTP/1.1\r\n\r\n")
            .await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn empty_request_is_bad_request() {
        let response = test_app().handle_request("").await;
        assert!(response.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn query_field_extraction() {
        let request = post(r#"{"query": "show me all customers"}"#);
        assert_eq!(
            extract_query_field(&request).as_deref(),
            Some("show me all customers")
        );
        assert_eq!(extract_query_field(&post("{}")), None);
        assert_eq!(extract_query_field("POST /query HTTP/1.1\r\n\r\n"), None);
    }

    #[test]
    fn content_length_header_is_parsed() {
        assert_eq!(
            content_length("POST /query HTTP/1.1\r\ncontent-length: 12\r\n"),
            12
        );
        assert_eq!(content_length("GET / HTTP/1.1\r\n"), 0);
    }

    #[test]
    fn response_carries_content_length() {
        let response = create_response(200, "OK", r#"{"ok":true}"#);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Length: 11\r\n"));
        assert!(response.ends_with(r#"{"ok":true}"#));
    }
}
