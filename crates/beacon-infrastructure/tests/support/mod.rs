//! Shared fakes for the infrastructure integration tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use beacon_domain::entities::{
    NewSourceCodeFile, NewSourceCodeVersion, Page, SourceCodeFile, SourceCodeVersion,
};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{FileFilter, SourceCodeRepository, VersionFilter};

/// Vec-backed source-code repository with real replace semantics
#[derive(Default)]
pub struct MemSourceCodeRepo {
    pub versions: Mutex<Vec<SourceCodeVersion>>,
    pub files: Mutex<Vec<SourceCodeFile>>,
    next_version_id: Mutex<i64>,
    next_file_id: Mutex<i64>,
}

impl MemSourceCodeRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceCodeRepository for MemSourceCodeRepo {
    async fn insert_version(
        &self,
        version: &NewSourceCodeVersion,
        files: &[NewSourceCodeFile],
    ) -> Result<i64> {
        let mut id_guard = self.next_version_id.lock().unwrap();
        *id_guard += 1;
        let version_id = *id_guard;
        drop(id_guard);

        self.versions.lock().unwrap().push(SourceCodeVersion {
            id: version_id,
            project_id: version.project_id.clone(),
            version: version.version.clone(),
            build_id: version.build_id.clone(),
            branch_name: version.branch_name.clone(),
            commit_message: version.commit_message.clone(),
            storage_path: version.storage_path.clone(),
            archive_name: version.archive_name.clone(),
            archive_size: version.archive_size,
            uploaded_by: version.uploaded_by.clone(),
            description: version.description.clone(),
            is_active: false,
            has_sourcemap: version.has_sourcemap,
            sourcemap_version: None,
            sourcemap_associated_at: None,
            created_at: Utc::now(),
        });

        let mut file_rows = self.files.lock().unwrap();
        for file in files {
            let mut id_guard = self.next_file_id.lock().unwrap();
            *id_guard += 1;
            let file_id = *id_guard;
            drop(id_guard);
            file_rows.push(SourceCodeFile {
                id: file_id,
                version_id,
                project_id: version.project_id.clone(),
                file_path: file.file_path.clone(),
                file_name: file.file_name.clone(),
                file_type: file.file_type.clone(),
                file_size: file.file_size,
                file_hash: file.file_hash.clone(),
                is_source_file: file.is_source_file,
                source_content: file.source_content.clone(),
                line_count: file.line_count,
                char_count: file.char_count,
            });
        }
        Ok(version_id)
    }

    async fn delete_versions(&self, project_id: &str, version: &str) -> Result<Vec<String>> {
        let mut versions = self.versions.lock().unwrap();
        let removed: Vec<SourceCodeVersion> = versions
            .iter()
            .filter(|v| v.project_id == project_id && v.version == version)
            .cloned()
            .collect();
        versions.retain(|v| !(v.project_id == project_id && v.version == version));
        let ids: Vec<i64> = removed.iter().map(|v| v.id).collect();
        self.files
            .lock()
            .unwrap()
            .retain(|f| !ids.contains(&f.version_id));
        Ok(removed.into_iter().map(|v| v.storage_path).collect())
    }

    async fn query_versions(&self, filter: &VersionFilter) -> Result<Page<SourceCodeVersion>> {
        let versions = self.versions.lock().unwrap();
        let items: Vec<SourceCodeVersion> = versions
            .iter()
            .filter(|v| {
                v.project_id == filter.project_id
                    && filter.version.as_ref().is_none_or(|w| &v.version == w)
            })
            .cloned()
            .collect();
        let total = items.len() as u64;
        Ok(Page {
            items,
            total,
            page: filter.page.unwrap_or(1),
            page_size: filter.page_size.unwrap_or(20),
        })
    }

    async fn find_version(&self, id: i64) -> Result<Option<SourceCodeVersion>> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn find_version_by_name(
        &self,
        project_id: &str,
        version: &str,
    ) -> Result<Option<SourceCodeVersion>> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.project_id == project_id && v.version == version)
            .max_by_key(|v| v.id)
            .cloned())
    }

    async fn find_active_version(&self, project_id: &str) -> Result<Option<SourceCodeVersion>> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.project_id == project_id && v.is_active)
            .cloned())
    }

    async fn set_active(&self, project_id: &str, version_id: i64) -> Result<()> {
        let mut versions = self.versions.lock().unwrap();
        if !versions
            .iter()
            .any(|v| v.id == version_id && v.project_id == project_id)
        {
            return Err(Error::not_found(format!("version {version_id}")));
        }
        for v in versions.iter_mut() {
            if v.project_id == project_id {
                v.is_active = v.id == version_id;
            }
        }
        Ok(())
    }

    async fn query_files(&self, filter: &FileFilter) -> Result<Page<SourceCodeFile>> {
        let files = self.files.lock().unwrap();
        let items: Vec<SourceCodeFile> = files
            .iter()
            .filter(|f| {
                filter.version_id.is_none_or(|id| f.version_id == id)
                    && filter
                        .project_id
                        .as_ref()
                        .is_none_or(|p| &f.project_id == p)
                    && filter
                        .file_name
                        .as_ref()
                        .is_none_or(|n| f.file_name.contains(n.as_str()))
            })
            .cloned()
            .collect();
        let total = items.len() as u64;
        Ok(Page {
            items,
            total,
            page: filter.page.unwrap_or(1),
            page_size: filter.page_size.unwrap_or(20),
        })
    }

    async fn find_file(&self, version_id: i64, file_path: &str) -> Result<Option<SourceCodeFile>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.version_id == version_id && f.file_path == file_path)
            .cloned())
    }
}
