//! LLM fallback translation
//!
//! When the schema heuristic finds no table, the question is sent to a
//! chat-completion API, trying a fixed ordered list of models until one
//! returns something shaped like a single SQL statement. Accepted output is
//! returned raw; note the shape check admits destructive statements
//! (INSERT/UPDATE/DELETE/CREATE/DROP/ALTER), matching the deployed
//! behavior of this service.

use crate::config::Config;
use crate::error::{AskdbError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

/// Models tried in order; the first validated answer wins.
pub const LLM_MODELS: [&str; 3] = ["mixtral-8x7b-32768", "llama3-8b", "gemma-7b"];

const SYSTEM_PROMPT: &str = "You are an expert MySQL query generator. \
    For the given English query, return ONLY a valid SQL query in a single line, \
    ending with a semicolon. Do not include any explanation, comments, or additional text.";

lazy_static! {
    static ref SQL_SHAPE: Regex = Regex::new(
        r"(?i)^\s*(SELECT|SHOW|INSERT|UPDATE|DELETE|CREATE|DROP|ALTER)\s+.*;$"
    )
    .expect("valid SQL shape regex");
}

/// Anchored shape check applied to trimmed model output: an allow-listed
/// leading keyword, then anything, ending in a semicolon with nothing after.
pub fn is_plausible_sql(candidate: &str) -> bool {
    SQL_SHAPE.is_match(candidate)
}

pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_api_key.clone().unwrap_or_default(),
            config.llm_base_url.clone(),
        )
    }

    /// Try each model in [`LLM_MODELS`] order; return the first output that
    /// passes the shape check, or `None` when every model fails. Upstream
    /// errors and rejected output are logged and treated as "next model".
    pub async fn translate(&self, natural_query: &str) -> Option<String> {
        for model in LLM_MODELS {
            info!("Trying model: {}", model);

            match self.request_sql(model, natural_query).await {
                Ok(content) => {
                    let candidate = content.trim();
                    if is_plausible_sql(candidate) {
                        info!("Generated SQL query: {}", candidate);
                        return Some(candidate.to_string());
                    }
                    warn!("Model {} returned no valid SQL statement", model);
                }
                Err(e) => warn!("Model {} failed: {}", model, e),
            }
        }
        None
    }

    async fn request_sql(&self, model: &str, natural_query: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": natural_query}
            ],
            // deterministic output
            "temperature": 0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AskdbError::Llm(format!("LLM API call failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AskdbError::Llm(format!(
                "LLM API returned status {}",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AskdbError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AskdbError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_each_allowlisted_keyword() {
        for sql in [
            "SELECT * FROM orders;",
            "SHOW TABLES LIKE 'x';",
            "INSERT INTO t VALUES (1);",
            "UPDATE t SET a = 1;",
            "DELETE FROM t WHERE id = 1;",
            "CREATE TABLE t (id INT);",
            "DROP TABLE t;",
            "ALTER TABLE t ADD c INT;",
        ] {
            assert!(is_plausible_sql(sql), "rejected: {}", sql);
        }
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_plausible_sql("select id from customers;"));
        assert!(is_plausible_sql("  Select id FROM customers;"));
    }

    #[test]
    fn rejects_missing_semicolon() {
        assert!(!is_plausible_sql("SELECT * FROM orders"));
    }

    #[test]
    fn rejects_trailing_prose() {
        assert!(!is_plausible_sql("SELECT * FROM orders; hope this helps"));
    }

    #[test]
    fn rejects_leading_prose() {
        assert!(!is_plausible_sql("Here is your query: SELECT * FROM orders;"));
    }

    #[test]
    fn rejects_bare_keyword() {
        assert!(!is_plausible_sql("SELECT;"));
        assert!(!is_plausible_sql(""));
    }

    #[test]
    fn rejects_non_allowlisted_keyword() {
        assert!(!is_plausible_sql("EXPLAIN SELECT 1;"));
        assert!(!is_plausible_sql("GRANT ALL ON db.* TO x;"));
    }

    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn completion_response(content: &str) -> String {
        let body = serde_json::json!({
            "choices": [{"message": {"content": content}}]
        })
        .to_string();
        http_response("200 OK", &body)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buffer[..pos]);
                let content_length = headers
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Serve one canned response per expected request, recording the model
    /// each request asked for. Returns the stub's base URL and the log.
    async fn spawn_completion_stub(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let models = Arc::new(Mutex::new(Vec::new()));
        let models_log = Arc::clone(&models);

        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_http_request(&mut stream).await;

                let body_start = request.find("\r\n\r\n").map(|p| p + 4).unwrap_or(0);
                let body: serde_json::Value =
                    serde_json::from_str(&request[body_start..]).unwrap_or_default();
                models_log.lock().unwrap().push(
                    body["model"].as_str().unwrap_or_default().to_string(),
                );

                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), models)
    }

    #[tokio::test]
    async fn all_models_failing_yields_no_result() {
        // One skip reason per model: upstream error status, unparseable
        // body, then output that fails the shape check.
        let (base_url, models) = spawn_completion_stub(vec![
            http_response("503 Service Unavailable", r#"{"error":"over capacity"}"#),
            http_response("200 OK", "oops"),
            completion_response("I cannot write SQL for that."),
        ])
        .await;

        let client = LlmClient::new("test-key".to_string(), base_url);
        let result = client.translate("what is the weather").await;

        assert_eq!(result, None);
        assert_eq!(*models.lock().unwrap(), LLM_MODELS);
    }

    #[tokio::test]
    async fn first_passing_model_wins() {
        let (base_url, models) = spawn_completion_stub(vec![
            completion_response("Sorry, I can only answer SQL questions."),
            completion_response("  SELECT * FROM weather;\n"),
        ])
        .await;

        let client = LlmClient::new("test-key".to_string(), base_url);
        let result = client.translate("what is the weather").await;

        // Trimmed output of the second model is accepted; the third is
        // never contacted.
        assert_eq!(result.as_deref(), Some("SELECT * FROM weather;"));
        assert_eq!(*models.lock().unwrap(), LLM_MODELS[..2]);
    }
}
