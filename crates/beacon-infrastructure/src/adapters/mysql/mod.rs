//! MySQL Metadata Store
//!
//! sqlx-backed repositories for the relational entities. Every logical
//! unit that spans rows (batch insert, upload replace, set-active, the
//! aggregation upsert) is one transaction; the upsert additionally relies
//! on the unique `(project_id, error_hash)` key plus
//! `ON DUPLICATE KEY UPDATE` for atomicity against concurrent workers.
//!
//! The schema lives in `migrations/0001_init.sql` and is applied with
//! [`run_migrations`] at startup.

mod aggregations;
mod error_logs;
mod projects;
mod source_code;

pub use aggregations::MysqlAggregationRepository;
pub use error_logs::MysqlErrorLogRepository;
pub use projects::MysqlProjectRepository;
pub use source_code::MysqlSourceCodeRepository;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tracing::info;

use beacon_domain::error::{Error, Result};

use crate::config::MysqlConfig;

/// Schema applied on startup; statements separated by `;` lines
const INIT_SQL: &str = include_str!("../../../migrations/0001_init.sql");

/// Connect a pool per configuration
///
/// # Errors
///
/// Returns `Unavailable` when the server cannot be reached.
pub async fn connect(config: &MysqlConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url())
        .await
        .map_err(|e| Error::unavailable_with_source("mysql connect failed", e))?;
    info!(host = %config.host, database = %config.database, "mysql connected");
    Ok(pool)
}

/// Apply the bundled schema, statement by statement (idempotent DDL)
///
/// # Errors
///
/// Returns a database error when a statement fails.
pub async fn run_migrations(pool: &MySqlPool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| Error::database_with_source("migration statement failed", e))?;
    }
    Ok(())
}

/// Map a sqlx error onto the taxonomy: connectivity → `Unavailable`,
/// everything else → `Database`
pub(crate) fn db_err(what: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| {
        let disconnected = matches!(
            e,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
        );
        if disconnected {
            Error::unavailable_with_source(format!("mysql unavailable during {what}"), e)
        } else {
            Error::database_with_source(format!("{what} failed"), e)
        }
    }
}

/// Read a nullable DATETIME(3) column as UTC
pub(crate) fn get_opt_datetime(row: &sqlx::mysql::MySqlRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let naive: Option<NaiveDateTime> = row
        .try_get(column)
        .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))?;
    Ok(naive.map(|n| n.and_utc()))
}

/// Read a DATETIME(3) column as UTC
pub(crate) fn get_datetime(row: &sqlx::mysql::MySqlRow, column: &str) -> Result<DateTime<Utc>> {
    let naive: NaiveDateTime = row
        .try_get(column)
        .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))?;
    Ok(naive.and_utc())
}

/// Read a nullable TEXT column holding JSON
pub(crate) fn get_opt_json(
    row: &sqlx::mysql::MySqlRow,
    column: &str,
) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))?;
    match raw {
        Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

/// Serialize an optional JSON value for a TEXT column
pub(crate) fn to_json_column(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    value.map(|v| serde_json::to_string(v).map_err(Error::from)).transpose()
}
