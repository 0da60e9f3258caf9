//! Schema inspection
//!
//! Lists tables and columns with a short-lived connection per call. There is
//! no cache: every request re-reads the live schema, so concurrent
//! migrations are always reflected. Failures are logged and surfaced as an
//! empty listing, never as an error.

use crate::config::Config;
use crate::db;
use sqlx::{Connection, Row};
use tracing::warn;

/// List table names in the database's native listing order.
pub async fn list_tables(config: &Config) -> Vec<String> {
    let mut conn = match db::connect(config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Database connection error: {}", e);
            return Vec::new();
        }
    };

    let tables = match sqlx::query("SHOW TABLES").fetch_all(&mut conn).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .collect(),
        Err(e) => {
            warn!("Error fetching tables: {}", e);
            Vec::new()
        }
    };

    let _ = conn.close().await;
    tables
}

/// List column names of a table in native order.
pub async fn list_columns(config: &Config, table: &str) -> Vec<String> {
    let mut conn = match db::connect(config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Database connection error: {}", e);
            return Vec::new();
        }
    };

    let statement = format!("SHOW COLUMNS FROM `{}`", table);
    let columns = match sqlx::query(&statement).fetch_all(&mut conn).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .collect(),
        Err(e) => {
            warn!("Error fetching columns for {}: {}", table, e);
            Vec::new()
        }
    };

    let _ = conn.close().await;
    columns
}
