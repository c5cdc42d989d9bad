//! Aggregation repository over MySQL.
//!
//! The upsert is the concurrency-sensitive path: the unique
//! `(project_id, error_hash)` key plus `ON DUPLICATE KEY UPDATE` makes the
//! counter merge atomic, and the whole group merge (row + distinct-user
//! side table + affected_users refresh) commits as one transaction.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use beacon_domain::entities::{
    AggregationStatus, AggregationUpdate, AggregationUpsert, DiagnosisHistoryEntry,
    ErrorAggregation, ErrorType, Page, UpsertOutcome,
};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{AggregationFilter, AggregationRepository};

use super::{db_err, get_datetime, get_opt_json};

/// sqlx-backed [`AggregationRepository`]
pub struct MysqlAggregationRepository {
    pool: MySqlPool,
}

impl MysqlAggregationRepository {
    /// Create the repository over a shared pool
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn row_to_aggregation(row: &MySqlRow) -> Result<ErrorAggregation> {
    let type_raw: String = row
        .try_get("error_type")
        .map_err(|e| Error::database_with_source("error_type unreadable", e))?;
    let error_type = ErrorType::parse(&type_raw)
        .ok_or_else(|| Error::database(format!("unknown error_type '{type_raw}'")))?;
    let status_raw: i8 = row
        .try_get("status")
        .map_err(|e| Error::database_with_source("status unreadable", e))?;
    let status = AggregationStatus::from_i8(status_raw)
        .ok_or_else(|| Error::database(format!("unknown status {status_raw}")))?;
    let get_str = |column: &str| -> Result<Option<String>> {
        row.try_get(column)
            .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))
    };

    let tags = get_str("tags")?
        .filter(|raw| !raw.is_empty())
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()?;
    let history = get_str("ai_diagnosis_history")?
        .filter(|raw| !raw.is_empty())
        .map(|raw| serde_json::from_str::<Vec<DiagnosisHistoryEntry>>(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(ErrorAggregation {
        id: row
            .try_get("id")
            .map_err(|e| Error::database_with_source("id unreadable", e))?,
        project_id: get_str("project_id")?.unwrap_or_default(),
        error_hash: get_str("error_hash")?.unwrap_or_default(),
        error_type,
        error_message: get_str("error_message")?.unwrap_or_default(),
        error_stack: get_str("error_stack")?,
        source_file: get_str("source_file")?,
        source_line: row
            .try_get("source_line")
            .map_err(|e| Error::database_with_source("source_line unreadable", e))?,
        source_column: row
            .try_get("source_column")
            .map_err(|e| Error::database_with_source("source_column unreadable", e))?,
        first_seen: get_datetime(row, "first_seen")?,
        last_seen: get_datetime(row, "last_seen")?,
        occurrence_count: row
            .try_get("occurrence_count")
            .map_err(|e| Error::database_with_source("occurrence_count unreadable", e))?,
        affected_users: row
            .try_get("affected_users")
            .map_err(|e| Error::database_with_source("affected_users unreadable", e))?,
        status,
        error_level: row
            .try_get("error_level")
            .map_err(|e| Error::database_with_source("error_level unreadable", e))?,
        assigned_to: get_str("assigned_to")?,
        notes: get_str("notes")?,
        tags,
        ai_diagnosis: get_str("ai_diagnosis")?,
        ai_fix_suggestion: get_str("ai_fix_suggestion")?,
        ai_diagnosis_history: history,
        comprehensive_analysis_report: get_opt_json(row, "comprehensive_analysis_report")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

#[async_trait]
impl AggregationRepository for MysqlAggregationRepository {
    async fn upsert(&self, upsert: &AggregationUpsert) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err("upsert begin"))?;
        let newest = upsert.newest_seen.naive_utc();

        // LAST_INSERT_ID(id) makes the existing row id observable on the
        // duplicate path; the unique key serializes concurrent merges
        sqlx::query(
            "INSERT INTO error_aggregations (
                project_id, error_hash, error_type, error_message, error_stack,
                source_file, source_line, source_column, first_seen, last_seen,
                occurrence_count, affected_users, status, error_level,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                id = LAST_INSERT_ID(id),
                occurrence_count = occurrence_count + VALUES(occurrence_count),
                last_seen = GREATEST(last_seen, VALUES(last_seen)),
                error_level = GREATEST(error_level, VALUES(error_level)),
                updated_at = VALUES(updated_at)",
        )
        .bind(&upsert.project_id)
        .bind(upsert.error_hash.as_str())
        .bind(upsert.error_type.as_str())
        .bind(&upsert.error_message)
        .bind(&upsert.error_stack)
        .bind(&upsert.source_file)
        .bind(upsert.source_line)
        .bind(upsert.source_column)
        .bind(newest)
        .bind(newest)
        .bind(upsert.batch_count)
        .bind(upsert.error_level)
        .bind(newest)
        .bind(newest)
        .execute(&mut *tx)
        .await
        .map_err(db_err("aggregation upsert"))?;

        let id: i64 = sqlx::query("SELECT LAST_INSERT_ID() AS id")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err("upsert id fetch"))?
            .try_get::<u64, _>("id")
            .map_err(|e| Error::database_with_source("id unreadable", e))? as i64;

        for user_id in &upsert.user_ids {
            sqlx::query(
                "INSERT IGNORE INTO error_aggregation_users (aggregation_id, user_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("user merge"))?;
        }
        sqlx::query(
            "UPDATE error_aggregations SET affected_users =
                (SELECT COUNT(*) FROM error_aggregation_users WHERE aggregation_id = ?)
             WHERE id = ?",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("affected users refresh"))?;

        let occurrence_count: u64 =
            sqlx::query("SELECT occurrence_count FROM error_aggregations WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err("count fetch"))?
                .try_get("occurrence_count")
                .map_err(|e| Error::database_with_source("occurrence_count unreadable", e))?;

        tx.commit().await.map_err(db_err("upsert commit"))?;
        Ok(UpsertOutcome {
            id,
            previous_count: occurrence_count.saturating_sub(upsert.batch_count),
            occurrence_count,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ErrorAggregation>> {
        let row = sqlx::query("SELECT * FROM error_aggregations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("aggregation fetch"))?;
        row.as_ref().map(row_to_aggregation).transpose()
    }

    async fn find_by_hash(
        &self,
        project_id: &str,
        error_hash: &str,
    ) -> Result<Option<ErrorAggregation>> {
        let row =
            sqlx::query("SELECT * FROM error_aggregations WHERE project_id = ? AND error_hash = ?")
                .bind(project_id)
                .bind(error_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("aggregation fetch by hash"))?;
        row.as_ref().map(row_to_aggregation).transpose()
    }

    async fn query(&self, filter: &AggregationFilter) -> Result<Page<ErrorAggregation>> {
        let mut clause = String::from(" WHERE 1=1");
        let mut params: Vec<String> = Vec::new();
        if let Some(project_id) = &filter.project_id {
            clause.push_str(" AND project_id = ?");
            params.push(project_id.clone());
        }
        if let Some(status) = filter.status {
            clause.push_str(" AND status = ?");
            params.push(status.to_string());
        }
        if let Some(error_type) = filter.error_type {
            clause.push_str(" AND error_type = ?");
            params.push(error_type.as_str().to_owned());
        }
        if let Some(keyword) = &filter.keyword {
            clause.push_str(" AND error_message LIKE ?");
            params.push(format!("%{keyword}%"));
        }

        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 200);
        let offset = (page - 1) * limit;

        let count_sql = format!("SELECT COUNT(*) AS total FROM error_aggregations{clause}");
        let mut count_query = sqlx::query(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("aggregation count"))?
            .try_get("total")
            .map_err(|e| Error::database_with_source("count unreadable", e))?;

        let select = format!(
            "SELECT * FROM error_aggregations{clause} ORDER BY last_seen DESC LIMIT ? OFFSET ?"
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
            .map_err(db_err("aggregation query"))?;

        let items = rows
            .iter()
            .map(row_to_aggregation)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size: limit,
        })
    }

    async fn update(&self, id: i64, update: &AggregationUpdate) -> Result<ErrorAggregation> {
        sqlx::query(
            "UPDATE error_aggregations SET
                status = COALESCE(?, status),
                error_level = COALESCE(?, error_level),
                notes = COALESCE(?, notes),
                assigned_to = COALESCE(?, assigned_to),
                tags = COALESCE(?, tags),
                updated_at = UTC_TIMESTAMP(3)
             WHERE id = ?",
        )
        .bind(update.status.map(|s| s.as_i8()))
        .bind(update.error_level)
        .bind(&update.notes)
        .bind(&update.assigned_to)
        .bind(
            update
                .tags
                .as_ref()
                .map(|tags| serde_json::to_string(tags))
                .transpose()?,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("aggregation update"))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("aggregation {id}")))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err("delete begin"))?;
        sqlx::query("DELETE FROM error_aggregation_users WHERE aggregation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("user rows delete"))?;
        sqlx::query("DELETE FROM error_aggregations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("aggregation delete"))?;
        tx.commit().await.map_err(db_err("delete commit"))?;
        Ok(())
    }

    async fn record_diagnosis(
        &self,
        id: i64,
        diagnosis: &str,
        fix_suggestion: Option<&str>,
        history: &[DiagnosisHistoryEntry],
        report: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE error_aggregations SET
                ai_diagnosis = ?, ai_fix_suggestion = ?, ai_diagnosis_history = ?,
                comprehensive_analysis_report = ?, updated_at = UTC_TIMESTAMP(3)
             WHERE id = ?",
        )
        .bind(diagnosis)
        .bind(fix_suggestion)
        .bind(serde_json::to_string(history)?)
        .bind(serde_json::to_string(report)?)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("diagnosis write"))?;
        Ok(())
    }
}
