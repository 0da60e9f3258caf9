//! Process configuration
//!
//! Built once at startup from environment variables (after `dotenv`) and
//! passed by reference into the components that need it. Nothing here is
//! global state.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    /// Bearer credential for the chat-completion API. Absent means the LLM
    /// fallback will fail upstream and translation misses surface as 400s.
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        let db_port = env::var("MYSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306);

        Self {
            db_host: env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".to_string()),
            db_port,
            db_user: env::var("MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
            db_password: env::var("MYSQL_PASSWORD").unwrap_or_default(),
            db_name: env::var("MYSQL_DB").unwrap_or_else(|_| "askdb".to_string()),
            llm_api_key: env::var("GROQ_API_KEY").ok(),
            llm_base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
        }
    }
}
