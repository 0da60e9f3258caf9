//! Natural language to SQL translation
//!
//! Two-stage strategy: a lexical heuristic over the live schema, with the
//! LLM client as fallback when no table is mentioned. The heuristic is a
//! best-effort substring/token match, not a parser; joins, filters and
//! aggregates degrade to a whole-table or full-column select.

use crate::config::Config;
use crate::llm::LlmClient;
use crate::schema;
use tracing::info;

/// Outcome of the translation chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Built lexically from the schema, no external service involved.
    Heuristic(String),
    /// Produced by the completion API fallback.
    Llm(String),
    /// Neither path yielded a statement.
    NoMatch,
}

impl Translation {
    pub fn into_sql(self) -> Option<String> {
        match self {
            Translation::Heuristic(sql) | Translation::Llm(sql) => Some(sql),
            Translation::NoMatch => None,
        }
    }
}

/// Translate an English question into a SQL statement.
///
/// The table list is fetched fresh; if a table name occurs in the question
/// the statement is built locally and the LLM is never consulted.
pub async fn translate(config: &Config, llm: &LlmClient, natural_query: &str) -> Translation {
    let tables = schema::list_tables(config).await;

    let Some(table) = detect_table(&tables, natural_query) else {
        return match llm.translate(natural_query).await {
            Some(sql) => Translation::Llm(sql),
            None => Translation::NoMatch,
        };
    };
    let table = table.to_string();

    let columns = schema::list_columns(config, &table).await;
    info!("Columns in `{}`: {:?}", table, columns);

    let sql = build_select(&table, natural_query, &columns);
    info!("Generated SQL query: {}", sql);
    Translation::Heuristic(sql)
}

/// First table (in listing order) whose name occurs case-insensitively in
/// the question. No word-boundary or longest-match logic; short table names
/// can false-positive, and ties go to listing order.
pub fn detect_table<'a>(tables: &'a [String], natural_query: &str) -> Option<&'a str> {
    let haystack = natural_query.to_lowercase();
    tables
        .iter()
        .find(|table| haystack.contains(table.as_str()))
        .map(String::as_str)
}

/// Build the SELECT for a detected table.
///
/// Tokens from the question (minus the first literal occurrence of the
/// table name) count as columns only on an exact case-sensitive match.
/// Matched columns keep input order and duplicates; none matched means
/// `SELECT *`.
pub fn build_select(table: &str, natural_query: &str, columns: &[String]) -> String {
    let remainder = natural_query.replacen(table, "", 1);
    let valid: Vec<&str> = remainder
        .split_whitespace()
        .filter(|token| columns.iter().any(|col| col == token))
        .collect();

    if valid.is_empty() {
        format!("SELECT * FROM `{}`;", table)
    } else {
        let quoted: Vec<String> = valid.iter().map(|col| format!("`{}`", col)).collect();
        format!("SELECT {} FROM `{}`;", quoted.join(", "), table)
    }
}
