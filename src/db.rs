//! Database connection and query execution using sqlx
//!
//! Connections are opened per request and closed unconditionally before the
//! result is returned. Nothing is pooled: the schema inspector and executor
//! always see the live database state.

use crate::config::Config;
use crate::error::{AskdbError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};

/// One result row: column name -> JSON value, in select order.
pub type Record = serde_json::Map<String, Value>;

/// Open a fresh connection to the configured database.
pub async fn connect(config: &Config) -> Result<MySqlConnection> {
    let options = MySqlConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_user)
        .password(&config.db_password)
        .database(&config.db_name);

    MySqlConnection::connect_with(&options)
        .await
        .map_err(|e| AskdbError::Database(format!("Database connection error: {}", e)))
}

/// Execute a complete SQL statement and fetch all rows as records.
///
/// Re-selects the configured database first, defensive against session
/// drift. The statement is a finished literal string; no parameters are
/// bound. Statements without a result set (INSERT etc.) yield an empty
/// record list.
pub async fn fetch_rows(
    conn: &mut MySqlConnection,
    db_name: &str,
    sql: &str,
) -> Result<Vec<Record>> {
    // Text protocol on both statements: USE cannot be prepared, and the
    // translated statement is an arbitrary literal that may not be either.
    let use_stmt = format!("USE `{}`", db_name);
    (&mut *conn)
        .execute(use_stmt.as_str())
        .await
        .map_err(|e| AskdbError::Database(e.to_string()))?;

    let rows = (&mut *conn)
        .fetch_all(sql)
        .await
        .map_err(|e| AskdbError::Database(e.to_string()))?;

    Ok(rows.iter().map(row_to_record).collect())
}

/// Convert one row into a column-name -> JSON-value mapping.
pub fn row_to_record(row: &MySqlRow) -> Record {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_info().name());
        record.insert(column.name().to_string(), value);
    }
    record
}

fn column_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|f| Value::from(f as f64))
            .unwrap_or(Value::Null),
        "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or(Value::Null),
        // CHAR/VARCHAR/TEXT/ENUM and anything else that decodes as text;
        // numeric DECIMAL falls through to the f64 attempt.
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .or_else(|| {
                row.try_get::<Option<f64>, _>(idx)
                    .ok()
                    .flatten()
                    .map(Value::from)
            })
            .unwrap_or(Value::Null),
    }
}
