//! Project registry over MySQL.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use uuid::Uuid;

use beacon_domain::entities::{NewProject, Project};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::ProjectRepository;

use super::{db_err, get_datetime, get_opt_json};

/// Admin listing ceiling
const LIST_LIMIT: u32 = 500;

/// sqlx-backed [`ProjectRepository`]
pub struct MysqlProjectRepository {
    pool: MySqlPool,
}

impl MysqlProjectRepository {
    /// Create the repository over a shared pool
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn row_to_project(row: &MySqlRow) -> Result<Project> {
    let get_str = |column: &str| -> Result<String> {
        row.try_get(column)
            .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))
    };
    Ok(Project {
        project_id: get_str("project_id")?,
        project_name: get_str("project_name")?,
        error_sampling_rate: row
            .try_get("error_sampling_rate")
            .map_err(|e| Error::database_with_source("error_sampling_rate unreadable", e))?,
        performance_sampling_rate: row
            .try_get("performance_sampling_rate")
            .map_err(|e| Error::database_with_source("performance_sampling_rate unreadable", e))?,
        data_retention_days: row
            .try_get("data_retention_days")
            .map_err(|e| Error::database_with_source("data_retention_days unreadable", e))?,
        alert_threshold: row
            .try_get("alert_threshold")
            .map_err(|e| Error::database_with_source("alert_threshold unreadable", e))?,
        sourcemap_config: get_opt_json(row, "sourcemap_config")?,
        api_key: get_str("api_key")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

#[async_trait]
impl ProjectRepository for MysqlProjectRepository {
    async fn create(&self, project: &NewProject) -> Result<Project> {
        let api_key = Uuid::new_v4().simple().to_string();
        sqlx::query(
            "INSERT INTO projects (
                project_id, project_name, error_sampling_rate,
                performance_sampling_rate, data_retention_days, alert_threshold,
                sourcemap_config, api_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, UTC_TIMESTAMP(3))",
        )
        .bind(&project.project_id)
        .bind(&project.project_name)
        .bind(project.error_sampling_rate.unwrap_or(1.0))
        .bind(project.performance_sampling_rate.unwrap_or(1.0))
        .bind(project.data_retention_days.unwrap_or(90))
        .bind(project.alert_threshold.unwrap_or(100))
        .bind(
            project
                .sourcemap_config
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(&api_key)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::conflict(format!("project {} already exists", project.project_id))
            }
            _ => db_err("project create")(e),
        })?;

        self.find_by_id(&project.project_id)
            .await?
            .ok_or_else(|| Error::internal("project vanished after insert"))
    }

    async fn find_by_id(&self, project_id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("project fetch"))?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("project fetch by key"))?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at LIMIT ?")
            .bind(LIST_LIMIT)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("project list"))?;
        rows.iter().map(row_to_project).collect()
    }
}
