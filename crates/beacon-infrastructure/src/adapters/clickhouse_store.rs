//! ClickHouse Log Store
//!
//! # Overview
//! Columnar mirror of error occurrences plus the materialized rollups the
//! dashboards read. The base table orders by
//! `(project_id, created_at, error_type)`, partitions monthly, and expires
//! rows after 90 days; two summing rollups (hourly, daily) are fed by
//! materialized views and answer statistics queries inside their windows.
//!
//! # Query routing
//! `hour` granularity within 72 h hits the hourly rollup, `day` within
//! 365 d hits the daily rollup, everything else scans the base table.
//! Base-table queries carry a 30 s deadline, rollup queries 10 s. Every
//! value reaches the server through the client binder, never by string
//! interpolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use beacon_domain::entities::NewErrorLog;
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    Granularity, LevelCount, LogQuery, LogStore, LogSummary, StatBucket, StatsQuery, StoreHealth,
    StoredLogRow, TrendPoint, TrendQuery, TypeCount,
};

use crate::config::ClickhouseConfig;

/// Base-table query deadline
const BASE_TIMEOUT: Duration = Duration::from_secs(30);
/// Rollup query deadline
const ROLLUP_TIMEOUT: Duration = Duration::from_secs(10);
/// Hourly rollup answers ranges up to this many hours
const HOURLY_WINDOW_H: u32 = 72;
/// Daily rollup answers ranges up to this many days
const DAILY_WINDOW_D: u32 = 365;

const BASE_TABLE: &str = "error_logs";

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS error_logs (
        id Int64,
        project_id String,
        error_type LowCardinality(String),
        error_hash String,
        error_message String,
        error_level UInt8,
        user_id String,
        page_url String,
        created_at DateTime
    )
    ENGINE = MergeTree
    PARTITION BY toYYYYMM(created_at)
    ORDER BY (project_id, created_at, error_type)
    TTL created_at + INTERVAL 90 DAY",
    "CREATE TABLE IF NOT EXISTS error_logs_hourly_stats (
        project_id String,
        hour DateTime,
        error_type LowCardinality(String),
        total_count UInt64,
        unique_hash AggregateFunction(uniq, String)
    )
    ENGINE = AggregatingMergeTree
    PARTITION BY toYYYYMM(hour)
    ORDER BY (project_id, hour, error_type)
    TTL hour + INTERVAL 90 DAY",
    "CREATE MATERIALIZED VIEW IF NOT EXISTS error_logs_hourly_mv
    TO error_logs_hourly_stats AS
    SELECT
        project_id,
        toStartOfHour(created_at) AS hour,
        error_type,
        count() AS total_count,
        uniqState(error_hash) AS unique_hash
    FROM error_logs
    GROUP BY project_id, hour, error_type",
    "CREATE TABLE IF NOT EXISTS error_logs_daily_stats (
        project_id String,
        date Date,
        error_type LowCardinality(String),
        total_count UInt64,
        unique_hash AggregateFunction(uniq, String)
    )
    ENGINE = AggregatingMergeTree
    PARTITION BY toYYYYMM(date)
    ORDER BY (project_id, date, error_type)
    TTL date + INTERVAL 400 DAY",
    "CREATE MATERIALIZED VIEW IF NOT EXISTS error_logs_daily_mv
    TO error_logs_daily_stats AS
    SELECT
        project_id,
        toDate(created_at) AS date,
        error_type,
        count() AS total_count,
        uniqState(error_hash) AS unique_hash
    FROM error_logs
    GROUP BY project_id, date, error_type",
];

/// Validates that a SQL identifier contains only safe characters.
/// Identifiers cannot ride the binder, so they are whitelisted instead.
fn validate_sql_identifier(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(Error::bad_request("identifier must be 1-128 chars"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('0');
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::bad_request(
            "identifier must start with a letter or underscore",
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::bad_request(
            "identifier may contain only alphanumerics and underscores",
        ));
    }
    Ok(())
}

#[derive(Debug, Row, Serialize)]
struct InsertRow {
    id: i64,
    project_id: String,
    error_type: String,
    error_hash: String,
    error_message: String,
    error_level: u8,
    user_id: String,
    page_url: String,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    created_at: DateTime<Utc>,
}

impl InsertRow {
    fn from_log(id: i64, log: &NewErrorLog) -> Self {
        Self {
            id,
            project_id: log.project_id.clone(),
            error_type: log.error_type.as_str().to_owned(),
            error_hash: log.error_hash.clone(),
            error_message: log.error_message.clone(),
            error_level: log.error_level,
            user_id: log.user_id.clone().unwrap_or_default(),
            page_url: log.page_url.clone().unwrap_or_default(),
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct SelectRow {
    id: i64,
    project_id: String,
    error_type: String,
    error_hash: String,
    error_message: String,
    error_level: u8,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Row, Deserialize)]
struct BucketRow {
    bucket: String,
    error_type: String,
    total_count: u64,
    unique_hash: u64,
}

#[derive(Debug, Row, Deserialize)]
struct TrendRow {
    bucket: String,
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct LevelRow {
    error_level: u8,
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct TypeRow {
    error_type: String,
    count: u64,
}

/// clickhouse-rs-backed [`LogStore`]
pub struct ClickhouseLogStore {
    client: Client,
    connected: AtomicBool,
}

impl ClickhouseLogStore {
    /// Build the client and ensure the schema exists
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when the server rejects the DDL round trip.
    pub async fn connect(config: &ClickhouseConfig) -> Result<Self> {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);
        let store = Self {
            client,
            connected: AtomicBool::new(false),
        };
        store.ensure_schema().await?;
        store.connected.store(true, Ordering::Relaxed);
        info!(url = %config.url, database = %config.database, "clickhouse connected");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in DDL {
            self.client
                .query(statement)
                .execute()
                .await
                .map_err(|e| Error::unavailable_with_source("clickhouse DDL failed", e))?;
        }
        Ok(())
    }

    fn mark(&self, result: &Result<()>) {
        self.connected.store(result.is_ok(), Ordering::Relaxed);
    }

    async fn with_deadline<T>(
        deadline: Duration,
        what: &str,
        fut: impl std::future::Future<Output = std::result::Result<T, clickhouse::error::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::log_store_with_source(format!("{what} failed"), e)),
            Err(_) => Err(Error::timeout(what.to_owned())),
        }
    }
}

#[async_trait]
impl LogStore for ClickhouseLogStore {
    async fn insert(&self, id: i64, log: &NewErrorLog) -> Result<()> {
        self.insert_batch(&[(id, log.clone())]).await
    }

    async fn insert_batch(&self, rows: &[(i64, NewErrorLog)]) -> Result<()> {
        let result: Result<()> = async {
            let mut insert = self
                .client
                .insert::<InsertRow>(BASE_TABLE)
                .await
                .map_err(|e| Error::log_store_with_source("insert open failed", e))?;
            for (id, log) in rows {
                insert
                    .write(&InsertRow::from_log(*id, log))
                    .await
                    .map_err(|e| Error::log_store_with_source("insert write failed", e))?;
            }
            insert
                .end()
                .await
                .map_err(|e| Error::log_store_with_source("insert flush failed", e))?;
            Ok(())
        }
        .await;
        self.mark(&result);
        result
    }

    async fn query(&self, project_id: &str, query: &LogQuery) -> Result<Vec<StoredLogRow>> {
        let mut sql = String::from(
            "SELECT id, project_id, error_type, error_hash, error_message, error_level, created_at
             FROM error_logs WHERE project_id = ?",
        );
        if query.start_time.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if query.end_time.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        if query.error_type.is_some() {
            sql.push_str(" AND error_type = ?");
        }
        if query.sample.is_some() {
            // deterministic pseudo-sample over the row id
            sql.push_str(" AND (cityHash64(id) % 10000) < ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = self.client.query(&sql).bind(project_id);
        if let Some(start) = query.start_time {
            q = q.bind(start.timestamp());
        }
        if let Some(end) = query.end_time {
            q = q.bind(end.timestamp());
        }
        if let Some(error_type) = query.error_type {
            q = q.bind(error_type.as_str());
        }
        if let Some(sample) = query.sample {
            let threshold = (sample.clamp(0.0, 1.0) * 10_000.0) as u64;
            q = q.bind(threshold);
        }
        q = q.bind(query.limit.max(1)).bind(query.offset);

        let rows: Vec<SelectRow> =
            Self::with_deadline(BASE_TIMEOUT, "log query", q.fetch_all()).await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredLogRow {
                id: r.id,
                project_id: r.project_id,
                error_type: r.error_type,
                error_hash: r.error_hash,
                error_message: r.error_message,
                error_level: r.error_level,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn stats(&self, project_id: &str, query: &StatsQuery) -> Result<Vec<StatBucket>> {
        let hours = query.time_range_hours.max(1);
        let (sql, deadline) = match query.granularity {
            Granularity::Hour if query.use_cache && hours <= HOURLY_WINDOW_H => (
                "SELECT formatDateTime(hour, '%Y-%m-%d %H:00:00') AS bucket,
                        error_type AS error_type,
                        sum(total_count) AS total_count,
                        uniqMerge(unique_hash) AS unique_hash
                 FROM error_logs_hourly_stats
                 WHERE project_id = ? AND hour >= now() - INTERVAL ? HOUR
                 GROUP BY hour, error_type ORDER BY hour",
                ROLLUP_TIMEOUT,
            ),
            Granularity::Day if query.use_cache && hours <= DAILY_WINDOW_D * 24 => (
                "SELECT toString(date) AS bucket,
                        error_type AS error_type,
                        sum(total_count) AS total_count,
                        uniqMerge(unique_hash) AS unique_hash
                 FROM error_logs_daily_stats
                 WHERE project_id = ? AND date >= toDate(now() - INTERVAL ? HOUR)
                 GROUP BY date, error_type ORDER BY date",
                ROLLUP_TIMEOUT,
            ),
            Granularity::Hour => (
                "SELECT formatDateTime(toStartOfHour(created_at), '%Y-%m-%d %H:00:00') AS bucket,
                        error_type AS error_type,
                        count() AS total_count,
                        uniq(error_hash) AS unique_hash
                 FROM error_logs
                 WHERE project_id = ? AND created_at >= now() - INTERVAL ? HOUR
                 GROUP BY bucket, error_type ORDER BY bucket",
                BASE_TIMEOUT,
            ),
            Granularity::Day => (
                "SELECT toString(toDate(created_at)) AS bucket,
                        error_type AS error_type,
                        count() AS total_count,
                        uniq(error_hash) AS unique_hash
                 FROM error_logs
                 WHERE project_id = ? AND created_at >= now() - INTERVAL ? HOUR
                 GROUP BY bucket, error_type ORDER BY bucket",
                BASE_TIMEOUT,
            ),
            Granularity::Total => (
                "SELECT 'total' AS bucket,
                        error_type AS error_type,
                        count() AS total_count,
                        uniq(error_hash) AS unique_hash
                 FROM error_logs
                 WHERE project_id = ? AND created_at >= now() - INTERVAL ? HOUR
                 GROUP BY error_type",
                BASE_TIMEOUT,
            ),
        };
        debug!(project_id, hours, deadline_s = deadline.as_secs(), "stats routed");

        let rows: Vec<BucketRow> = Self::with_deadline(
            deadline,
            "stats query",
            self.client.query(sql).bind(project_id).bind(hours).fetch_all(),
        )
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| StatBucket {
                bucket: r.bucket,
                error_type: r.error_type,
                total_count: r.total_count,
                unique_hash: r.unique_hash,
            })
            .collect())
    }

    async fn trend(&self, project_id: &str, query: &TrendQuery) -> Result<Vec<TrendPoint>> {
        let hours = query.time_range_hours.max(1);
        let use_daily = matches!(query.granularity, Granularity::Day) && hours <= DAILY_WINDOW_D * 24;

        let (mut sql, deadline) = if use_daily {
            (
                String::from(
                    "SELECT toString(date) AS bucket, sum(total_count) AS count
                     FROM error_logs_daily_stats
                     WHERE project_id = ? AND date >= toDate(now() - INTERVAL ? HOUR)",
                ),
                ROLLUP_TIMEOUT,
            )
        } else {
            (
                String::from(
                    "SELECT formatDateTime(toStartOfHour(created_at), '%Y-%m-%d %H:00:00') AS bucket,
                            count() AS count
                     FROM error_logs
                     WHERE project_id = ? AND created_at >= now() - INTERVAL ? HOUR",
                ),
                BASE_TIMEOUT,
            )
        };
        if query.error_type.is_some() {
            sql.push_str(" AND error_type = ?");
        }
        sql.push_str(" GROUP BY bucket ORDER BY bucket");

        let mut q = self.client.query(&sql).bind(project_id).bind(hours);
        if let Some(error_type) = query.error_type {
            q = q.bind(error_type.as_str());
        }
        let rows: Vec<TrendRow> = Self::with_deadline(deadline, "trend query", q.fetch_all()).await?;
        Ok(rows
            .into_iter()
            .map(|r| TrendPoint {
                bucket: r.bucket,
                count: r.count,
            })
            .collect())
    }

    async fn summary(
        &self,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<LogSummary> {
        let start = start.map_or(0, |s| s.timestamp());
        let end = end.map_or_else(|| Utc::now().timestamp(), |e| e.timestamp());

        let total: u64 = Self::with_deadline(
            BASE_TIMEOUT,
            "summary total",
            self.client
                .query(
                    "SELECT count() FROM error_logs
                     WHERE project_id = ? AND created_at >= ? AND created_at <= ?",
                )
                .bind(project_id)
                .bind(start)
                .bind(end)
                .fetch_one(),
        )
        .await?;

        let by_level: Vec<LevelRow> = Self::with_deadline(
            BASE_TIMEOUT,
            "summary by level",
            self.client
                .query(
                    "SELECT error_level, count() AS count FROM error_logs
                     WHERE project_id = ? AND created_at >= ? AND created_at <= ?
                     GROUP BY error_level ORDER BY error_level",
                )
                .bind(project_id)
                .bind(start)
                .bind(end)
                .fetch_all(),
        )
        .await?;

        let by_type: Vec<TypeRow> = Self::with_deadline(
            BASE_TIMEOUT,
            "summary by type",
            self.client
                .query(
                    "SELECT error_type, count() AS count FROM error_logs
                     WHERE project_id = ? AND created_at >= ? AND created_at <= ?
                     GROUP BY error_type ORDER BY count DESC",
                )
                .bind(project_id)
                .bind(start)
                .bind(end)
                .fetch_all(),
        )
        .await?;

        Ok(LogSummary {
            total,
            by_level: by_level
                .into_iter()
                .map(|r| LevelCount {
                    error_level: r.error_level,
                    count: r.count,
                })
                .collect(),
            by_type: by_type
                .into_iter()
                .map(|r| TypeCount {
                    error_type: r.error_type,
                    count: r.count,
                })
                .collect(),
        })
    }

    async fn cleanup_older_than(&self, days: u32) -> Result<u64> {
        let affected: u64 = Self::with_deadline(
            BASE_TIMEOUT,
            "cleanup count",
            self.client
                .query("SELECT count() FROM error_logs WHERE created_at < now() - INTERVAL ? DAY")
                .bind(days)
                .fetch_one(),
        )
        .await?;
        Self::with_deadline(
            BASE_TIMEOUT,
            "cleanup mutation",
            self.client
                .query("ALTER TABLE error_logs DELETE WHERE created_at < now() - INTERVAL ? DAY")
                .bind(days)
                .execute(),
        )
        .await?;
        info!(days, affected, "columnar cleanup issued");
        Ok(affected)
    }

    async fn optimize_table(&self, table: &str) -> Result<()> {
        validate_sql_identifier(table)?;
        let sql = format!("OPTIMIZE TABLE {table} FINAL");
        Self::with_deadline(BASE_TIMEOUT, "optimize", self.client.query(&sql).execute()).await?;
        info!(table, "optimize issued");
        Ok(())
    }

    async fn health(&self) -> StoreHealth {
        let probe: Result<u8> = Self::with_deadline(
            Duration::from_secs(5),
            "health probe",
            self.client.query("SELECT 1").fetch_one(),
        )
        .await;
        let ok = probe.is_ok();
        if !ok {
            warn!("clickhouse health probe failed");
        }
        self.connected.store(ok, Ordering::Relaxed);
        StoreHealth {
            ok,
            connected: self.connected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation_blocks_injection() {
        assert!(validate_sql_identifier("error_logs").is_ok());
        assert!(validate_sql_identifier("error_logs_hourly_stats").is_ok());
        assert!(validate_sql_identifier("t; DROP TABLE x").is_err());
        assert!(validate_sql_identifier("1table").is_err());
        assert!(validate_sql_identifier("").is_err());
    }

    #[test]
    fn rollup_windows_match_the_router_contract() {
        assert_eq!(HOURLY_WINDOW_H, 72);
        assert_eq!(DAILY_WINDOW_D, 365);
        assert_eq!(BASE_TIMEOUT, Duration::from_secs(30));
        assert_eq!(ROLLUP_TIMEOUT, Duration::from_secs(10));
    }
}
