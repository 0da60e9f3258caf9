pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod llm;
pub mod schema;
pub mod translate;
