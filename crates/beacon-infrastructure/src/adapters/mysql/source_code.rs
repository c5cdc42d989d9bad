//! Source-code version and file repository over MySQL.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use tracing::debug;

use beacon_domain::entities::{
    NewSourceCodeFile, NewSourceCodeVersion, Page, SourceCodeFile, SourceCodeVersion,
};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{FileFilter, SourceCodeRepository, VersionFilter};

use super::{db_err, get_datetime, get_opt_datetime};

/// sqlx-backed [`SourceCodeRepository`]
pub struct MysqlSourceCodeRepository {
    pool: MySqlPool,
}

impl MysqlSourceCodeRepository {
    /// Create the repository over a shared pool
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn row_to_version(row: &MySqlRow) -> Result<SourceCodeVersion> {
    let get_str = |column: &str| -> Result<Option<String>> {
        row.try_get(column)
            .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))
    };
    Ok(SourceCodeVersion {
        id: row
            .try_get("id")
            .map_err(|e| Error::database_with_source("id unreadable", e))?,
        project_id: get_str("project_id")?.unwrap_or_default(),
        version: get_str("version")?.unwrap_or_default(),
        build_id: get_str("build_id")?,
        branch_name: get_str("branch_name")?,
        commit_message: get_str("commit_message")?,
        storage_path: get_str("storage_path")?.unwrap_or_default(),
        archive_name: get_str("archive_name")?.unwrap_or_default(),
        archive_size: row
            .try_get("archive_size")
            .map_err(|e| Error::database_with_source("archive_size unreadable", e))?,
        uploaded_by: get_str("uploaded_by")?,
        description: get_str("description")?,
        is_active: row
            .try_get::<bool, _>("is_active")
            .map_err(|e| Error::database_with_source("is_active unreadable", e))?,
        has_sourcemap: row
            .try_get::<bool, _>("has_sourcemap")
            .map_err(|e| Error::database_with_source("has_sourcemap unreadable", e))?,
        sourcemap_version: get_str("sourcemap_version")?,
        sourcemap_associated_at: get_opt_datetime(row, "sourcemap_associated_at")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

fn row_to_file(row: &MySqlRow) -> Result<SourceCodeFile> {
    let get_str = |column: &str| -> Result<Option<String>> {
        row.try_get(column)
            .map_err(|e| Error::database_with_source(format!("column {column} unreadable"), e))
    };
    Ok(SourceCodeFile {
        id: row
            .try_get("id")
            .map_err(|e| Error::database_with_source("id unreadable", e))?,
        version_id: row
            .try_get("version_id")
            .map_err(|e| Error::database_with_source("version_id unreadable", e))?,
        project_id: get_str("project_id")?.unwrap_or_default(),
        file_path: get_str("file_path")?.unwrap_or_default(),
        file_name: get_str("file_name")?.unwrap_or_default(),
        file_type: get_str("file_type")?.unwrap_or_default(),
        file_size: row
            .try_get("file_size")
            .map_err(|e| Error::database_with_source("file_size unreadable", e))?,
        file_hash: get_str("file_hash")?.unwrap_or_default(),
        is_source_file: row
            .try_get::<bool, _>("is_source_file")
            .map_err(|e| Error::database_with_source("is_source_file unreadable", e))?,
        source_content: get_str("source_content")?,
        line_count: row
            .try_get("line_count")
            .map_err(|e| Error::database_with_source("line_count unreadable", e))?,
        char_count: row
            .try_get("char_count")
            .map_err(|e| Error::database_with_source("char_count unreadable", e))?,
    })
}

#[async_trait]
impl SourceCodeRepository for MysqlSourceCodeRepository {
    async fn insert_version(
        &self,
        version: &NewSourceCodeVersion,
        files: &[NewSourceCodeFile],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_err("version begin"))?;
        let result = sqlx::query(
            "INSERT INTO source_code_versions (
                project_id, version, build_id, branch_name, commit_message,
                storage_path, archive_name, archive_size, uploaded_by,
                description, is_active, has_sourcemap, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, UTC_TIMESTAMP(3))",
        )
        .bind(&version.project_id)
        .bind(&version.version)
        .bind(&version.build_id)
        .bind(&version.branch_name)
        .bind(&version.commit_message)
        .bind(&version.storage_path)
        .bind(&version.archive_name)
        .bind(version.archive_size)
        .bind(&version.uploaded_by)
        .bind(&version.description)
        .bind(version.has_sourcemap)
        .execute(&mut *tx)
        .await
        .map_err(db_err("version insert"))?;
        let version_id = result.last_insert_id() as i64;

        for file in files {
            sqlx::query(
                "INSERT INTO source_code_files (
                    version_id, project_id, file_path, file_name, file_type,
                    file_size, file_hash, is_source_file, source_content,
                    line_count, char_count
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(version_id)
            .bind(&version.project_id)
            .bind(&file.file_path)
            .bind(&file.file_name)
            .bind(&file.file_type)
            .bind(file.file_size)
            .bind(&file.file_hash)
            .bind(file.is_source_file)
            .bind(&file.source_content)
            .bind(file.line_count)
            .bind(file.char_count)
            .execute(&mut *tx)
            .await
            .map_err(db_err("file insert"))?;
        }
        tx.commit().await.map_err(db_err("version commit"))?;
        debug!(version_id, files = files.len(), "version inserted");
        Ok(version_id)
    }

    async fn delete_versions(&self, project_id: &str, version: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err("delete begin"))?;
        let rows = sqlx::query(
            "SELECT id, storage_path FROM source_code_versions WHERE project_id = ? AND version = ?",
        )
        .bind(project_id)
        .bind(version)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("version lookup"))?;

        let mut paths = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| Error::database_with_source("id unreadable", e))?;
            let path: String = row
                .try_get("storage_path")
                .map_err(|e| Error::database_with_source("storage_path unreadable", e))?;
            sqlx::query("DELETE FROM source_code_files WHERE version_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("files delete"))?;
            sqlx::query("DELETE FROM source_code_versions WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("version delete"))?;
            paths.push(path);
        }
        tx.commit().await.map_err(db_err("delete commit"))?;
        Ok(paths)
    }

    async fn query_versions(&self, filter: &VersionFilter) -> Result<Page<SourceCodeVersion>> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.page_size.unwrap_or(20).clamp(1, 200);
        let offset = (page - 1) * limit;

        let mut clause = String::from(" WHERE project_id = ?");
        let mut params = vec![filter.project_id.clone()];
        if let Some(version) = &filter.version {
            clause.push_str(" AND version = ?");
            params.push(version.clone());
        }

        let count_sql = format!("SELECT COUNT(*) AS total FROM source_code_versions{clause}");
        let mut count_query = sqlx::query(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("version count"))?
            .try_get("total")
            .map_err(|e| Error::database_with_source("count unreadable", e))?;

        let select = format!(
            "SELECT * FROM source_code_versions{clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
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
            .map_err(db_err("version query"))?;

        let items = rows.iter().map(row_to_version).collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size: limit,
        })
    }

    async fn find_version(&self, id: i64) -> Result<Option<SourceCodeVersion>> {
        let row = sqlx::query("SELECT * FROM source_code_versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("version fetch"))?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn find_version_by_name(
        &self,
        project_id: &str,
        version: &str,
    ) -> Result<Option<SourceCodeVersion>> {
        let row = sqlx::query(
            "SELECT * FROM source_code_versions WHERE project_id = ? AND version = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(project_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("version fetch by name"))?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn find_active_version(&self, project_id: &str) -> Result<Option<SourceCodeVersion>> {
        let row = sqlx::query(
            "SELECT * FROM source_code_versions WHERE project_id = ? AND is_active = 1 LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("active version fetch"))?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn set_active(&self, project_id: &str, version_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err("set-active begin"))?;
        sqlx::query("UPDATE source_code_versions SET is_active = 0 WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("active clear"))?;
        let result = sqlx::query(
            "UPDATE source_code_versions SET is_active = 1 WHERE id = ? AND project_id = ?",
        )
        .bind(version_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("active set"))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "version {version_id} in project {project_id}"
            )));
        }
        tx.commit().await.map_err(db_err("set-active commit"))?;
        Ok(())
    }

    async fn query_files(&self, filter: &FileFilter) -> Result<Page<SourceCodeFile>> {
        if filter.version_id.is_none() && filter.project_id.is_none() && filter.file_name.is_none()
        {
            return Err(Error::bad_request(
                "file query needs versionId, projectId, or fileName",
            ));
        }
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.page_size.unwrap_or(20).clamp(1, 500);
        let offset = (page - 1) * limit;

        let mut clause = String::from(" WHERE 1=1");
        let mut params: Vec<String> = Vec::new();
        if let Some(version_id) = filter.version_id {
            clause.push_str(" AND version_id = ?");
            params.push(version_id.to_string());
        }
        if let Some(project_id) = &filter.project_id {
            clause.push_str(" AND project_id = ?");
            params.push(project_id.clone());
        }
        if let Some(version) = &filter.version {
            clause.push_str(
                " AND version_id IN (SELECT id FROM source_code_versions
                   WHERE project_id = ? AND version = ?)",
            );
            params.push(filter.project_id.clone().unwrap_or_default());
            params.push(version.clone());
        }
        if let Some(file_name) = &filter.file_name {
            clause.push_str(" AND file_name LIKE ?");
            params.push(format!("%{file_name}%"));
        }

        let count_sql = format!("SELECT COUNT(*) AS total FROM source_code_files{clause}");
        let mut count_query = sqlx::query(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("file count"))?
            .try_get("total")
            .map_err(|e| Error::database_with_source("count unreadable", e))?;

        let select = format!(
            "SELECT * FROM source_code_files{clause} ORDER BY file_path LIMIT ? OFFSET ?"
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
            .map_err(db_err("file query"))?;

        let items = rows.iter().map(row_to_file).collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size: limit,
        })
    }

    async fn find_file(&self, version_id: i64, file_path: &str) -> Result<Option<SourceCodeFile>> {
        let row =
            sqlx::query("SELECT * FROM source_code_files WHERE version_id = ? AND file_path = ?")
                .bind(version_id)
                .bind(file_path)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("file fetch"))?;
        row.as_ref().map(row_to_file).transpose()
    }
}
