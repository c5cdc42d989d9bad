//! Error-log repository over MySQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use tracing::debug;

use beacon_domain::entities::{ErrorLog, ErrorType, NewErrorLog, Page, ResolvedLocation};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{ErrorLogFilter, ErrorLogRepository, SortOrder};

use super::{db_err, get_datetime, get_opt_datetime, get_opt_json, to_json_column};

/// Columns allowed in ORDER BY, guarding against injection via sortField
const SORTABLE_COLUMNS: &[&str] = &["id", "created_at", "error_level", "error_type"];

const INSERT_SQL: &str = "INSERT INTO error_logs (
        project_id, error_type, error_hash, error_message, error_stack,
        page_url, user_id, user_agent, device_info, network_info,
        performance_data, source_file, source_line, source_column,
        project_version, build_id, error_level, is_source_resolved,
        is_processed, created_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)";

/// sqlx-backed [`ErrorLogRepository`]
pub struct MysqlErrorLogRepository {
    pool: MySqlPool,
}

impl MysqlErrorLogRepository {
    /// Create the repository over a shared pool
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn bind_new_log<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    log: &'q NewErrorLog,
    device_info: Option<String>,
    network_info: Option<String>,
    performance_data: Option<String>,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    query
        .bind(&log.project_id)
        .bind(log.error_type.as_str())
        .bind(&log.error_hash)
        .bind(&log.error_message)
        .bind(&log.error_stack)
        .bind(&log.page_url)
        .bind(&log.user_id)
        .bind(&log.user_agent)
        .bind(device_info)
        .bind(network_info)
        .bind(performance_data)
        .bind(&log.source_file)
        .bind(log.source_line)
        .bind(log.source_column)
        .bind(&log.project_version)
        .bind(&log.build_id)
        .bind(log.error_level)
        .bind(log.created_at.naive_utc())
}

fn row_to_log(row: &MySqlRow) -> Result<ErrorLog> {
    let type_raw: String = row
        .try_get("error_type")
        .map_err(|e| Error::database_with_source("error_type unreadable", e))?;
    let error_type = ErrorType::parse(&type_raw)
        .ok_or_else(|| Error::database(format!("unknown error_type '{type_raw}'")))?;
    let get_str = |column: &str| -> Result<Option<String>> {
        row.try_get(column)
            .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))
    };

    Ok(ErrorLog {
        id: row
            .try_get("id")
            .map_err(|e| Error::database_with_source("id unreadable", e))?,
        project_id: get_str("project_id")?.unwrap_or_default(),
        error_type,
        error_hash: get_str("error_hash")?.unwrap_or_default(),
        error_message: get_str("error_message")?.unwrap_or_default(),
        error_stack: get_str("error_stack")?,
        page_url: get_str("page_url")?,
        user_id: get_str("user_id")?,
        user_agent: get_str("user_agent")?,
        device_info: get_opt_json(row, "device_info")?,
        network_info: get_opt_json(row, "network_info")?,
        performance_data: get_opt_json(row, "performance_data")?,
        source_file: get_str("source_file")?,
        source_line: row
            .try_get("source_line")
            .map_err(|e| Error::database_with_source("source_line unreadable", e))?,
        source_column: row
            .try_get("source_column")
            .map_err(|e| Error::database_with_source("source_column unreadable", e))?,
        project_version: get_str("project_version")?,
        build_id: get_str("build_id")?,
        original_source: get_str("original_source")?,
        original_line: row
            .try_get("original_line")
            .map_err(|e| Error::database_with_source("original_line unreadable", e))?,
        original_column: row
            .try_get("original_column")
            .map_err(|e| Error::database_with_source("original_column unreadable", e))?,
        function_name: get_str("function_name")?,
        source_snippet: get_str("source_snippet")?,
        is_source_resolved: row
            .try_get::<bool, _>("is_source_resolved")
            .map_err(|e| Error::database_with_source("is_source_resolved unreadable", e))?,
        ai_diagnosis: get_str("ai_diagnosis")?,
        comprehensive_analysis_report: get_opt_json(row, "comprehensive_analysis_report")?,
        comprehensive_analysis_generated_at: get_opt_datetime(
            row,
            "comprehensive_analysis_generated_at",
        )?,
        error_level: row
            .try_get("error_level")
            .map_err(|e| Error::database_with_source("error_level unreadable", e))?,
        is_processed: row
            .try_get::<bool, _>("is_processed")
            .map_err(|e| Error::database_with_source("is_processed unreadable", e))?,
        created_at: get_datetime(row, "created_at")?,
    })
}

/// WHERE clause and string parameters for a filter (all bound, never
/// interpolated)
fn filter_clause(filter: &ErrorLogFilter) -> (String, Vec<String>) {
    let mut clause = String::from(" WHERE project_id = ?");
    let mut params = vec![filter.project_id.clone()];

    if let Some(error_type) = filter.error_type {
        clause.push_str(" AND error_type = ?");
        params.push(error_type.as_str().to_owned());
    }
    if let Some(level) = filter.error_level {
        clause.push_str(" AND error_level = ?");
        params.push(level.to_string());
    }
    if let Some(keyword) = &filter.keyword {
        clause.push_str(" AND (error_message LIKE ? OR error_stack LIKE ?)");
        let pattern = format!("%{keyword}%");
        params.push(pattern.clone());
        params.push(pattern);
    }
    if let Some(source_file) = &filter.source_file {
        clause.push_str(" AND source_file = ?");
        params.push(source_file.clone());
    }
    if let Some(page_url) = &filter.page_url {
        clause.push_str(" AND page_url = ?");
        params.push(page_url.clone());
    }
    if let Some(user_id) = &filter.user_id {
        clause.push_str(" AND user_id = ?");
        params.push(user_id.clone());
    }
    if let Some(start) = filter.start_date {
        clause.push_str(" AND created_at >= ?");
        params.push(start.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    }
    if let Some(end) = filter.end_date {
        clause.push_str(" AND created_at <= ?");
        params.push(end.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    }
    (clause, params)
}

#[async_trait]
impl ErrorLogRepository for MysqlErrorLogRepository {
    async fn insert(&self, log: &NewErrorLog) -> Result<i64> {
        let device = to_json_column(log.device_info.as_ref())?;
        let network = to_json_column(log.network_info.as_ref())?;
        let perf = to_json_column(log.performance_data.as_ref())?;
        let result = bind_new_log(sqlx::query(INSERT_SQL), log, device, network, perf)
            .execute(&self.pool)
            .await
            .map_err(db_err("error log insert"))?;
        Ok(result.last_insert_id() as i64)
    }

    async fn insert_batch(&self, logs: &[NewErrorLog]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await.map_err(db_err("batch begin"))?;
        let mut ids = Vec::with_capacity(logs.len());
        for log in logs {
            let device = to_json_column(log.device_info.as_ref())?;
            let network = to_json_column(log.network_info.as_ref())?;
            let perf = to_json_column(log.performance_data.as_ref())?;
            let result = bind_new_log(sqlx::query(INSERT_SQL), log, device, network, perf)
                .execute(&mut *tx)
                .await
                .map_err(db_err("batch insert"))?;
            ids.push(result.last_insert_id() as i64);
        }
        tx.commit().await.map_err(db_err("batch commit"))?;
        Ok(ids)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorLog>> {
        let row = sqlx::query("SELECT * FROM error_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("error log fetch"))?;
        row.as_ref().map(row_to_log).transpose()
    }

    async fn query(&self, filter: &ErrorLogFilter) -> Result<Page<ErrorLog>> {
        let (clause, params) = filter_clause(filter);
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 500);
        let offset = (page - 1) * limit;

        let sort_field = filter
            .sort_field
            .as_deref()
            .filter(|f| SORTABLE_COLUMNS.contains(f))
            .unwrap_or("created_at");
        let sort_order = match filter.sort_order {
            Some(SortOrder::Asc) => "ASC",
            _ => "DESC",
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM error_logs{clause}");
        let mut count_query = sqlx::query(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("error log count"))?
            .try_get("total")
            .map_err(|e| Error::database_with_source("count unreadable", e))?;

        let select = format!(
            "SELECT * FROM error_logs{clause} ORDER BY {sort_field} {sort_order} LIMIT ? OFFSET ?"
        );
        let mut select_query = sqlx::query(&select);
        for param in &params {
            select_query = select_query.bind(param);
        }
        let rows = select_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("error log query"))?;

        let items = rows.iter().map(row_to_log).collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size: limit,
        })
    }

    async fn find_unprocessed(&self, project_id: &str, limit: u32) -> Result<Vec<ErrorLog>> {
        let rows = sqlx::query(
            "SELECT * FROM error_logs WHERE project_id = ? AND is_processed = 0 ORDER BY id LIMIT ?",
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("unprocessed fetch"))?;
        rows.iter().map(row_to_log).collect()
    }

    async fn mark_processed(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE error_logs SET is_processed = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(db_err("mark processed"))?;
        Ok(())
    }

    async fn apply_resolution(&self, id: i64, resolution: &ResolvedLocation) -> Result<()> {
        let result = sqlx::query(
            "UPDATE error_logs SET
                original_source = ?, original_line = ?, original_column = ?,
                function_name = ?, source_snippet = ?, is_source_resolved = 1
             WHERE id = ?",
        )
        .bind(&resolution.original_source)
        .bind(resolution.original_line)
        .bind(resolution.original_column)
        .bind(&resolution.function_name)
        .bind(&resolution.source_snippet)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("resolution write-back"))?;
        debug!(error_id = id, rows = result.rows_affected(), "resolution applied");
        Ok(())
    }

    async fn mirror_diagnosis(
        &self,
        project_id: &str,
        error_hash: &str,
        diagnosis: &str,
        report: &serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE error_logs SET
                ai_diagnosis = ?, comprehensive_analysis_report = ?,
                comprehensive_analysis_generated_at = ?
             WHERE project_id = ? AND error_hash = ?",
        )
        .bind(diagnosis)
        .bind(serde_json::to_string(report)?)
        .bind(generated_at.naive_utc())
        .bind(project_id)
        .bind(error_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err("diagnosis mirror"))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_filter() -> ErrorLogFilter {
        ErrorLogFilter {
            project_id: "p1".to_owned(),
            ..ErrorLogFilter::default()
        }
    }

    #[test]
    fn filter_clause_binds_every_param() {
        let filter = ErrorLogFilter {
            error_type: Some(ErrorType::JsError),
            error_level: Some(3),
            keyword: Some("undefined".to_owned()),
            user_id: Some("u1".to_owned()),
            ..base_filter()
        };
        let (clause, params) = filter_clause(&filter);
        assert_eq!(clause.matches('?').count(), params.len());
        assert!(clause.contains("error_message LIKE ?"));
        assert!(params.contains(&"%undefined%".to_owned()));
    }

    #[test]
    fn unknown_sort_fields_fall_back_to_created_at() {
        // the whitelist is the only path into ORDER BY
        assert!(!SORTABLE_COLUMNS.contains(&"error_message; DROP TABLE"));
        assert!(SORTABLE_COLUMNS.contains(&"created_at"));
    }
}
