//! Source Archive Store Port
//!
//! Versioned, immutable zip archives of project source trees, with
//! on-demand file extraction. Upload replaces any prior archive of the same
//! `(project, version)` — rows, files, and on-disk zip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{SourceCodeFile, SourceWindow};
use crate::error::Result;

/// Upload request assembled by the HTTP layer
#[derive(Debug, Clone)]
pub struct ArchiveUpload {
    /// Project from the form field (reconciled against manifest.json)
    pub project_id: Option<String>,
    /// Version from the form field (generated when absent on both sides)
    pub version: Option<String>,
    /// Build identifier
    pub build_id: Option<String>,
    /// VCS branch name
    pub branch_name: Option<String>,
    /// VCS commit message
    pub commit_message: Option<String>,
    /// Who uploaded the archive
    pub uploaded_by: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Flip the active flag to this version after persisting
    pub set_as_active: bool,
    /// Original archive filename
    pub archive_name: String,
    /// Raw zip bytes
    pub bytes: Vec<u8>,
}

/// Upload result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Assigned version row id
    pub version_id: i64,
    /// Effective version string (may be generated)
    pub version: String,
    /// Accepted file count
    pub file_count: usize,
}

/// A file with its full decoded content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    /// The file row
    pub file: SourceCodeFile,
    /// Full UTF-8 content (inlined or lazily extracted from the zip)
    pub content: String,
}

/// A file with content and an optional line window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedSource {
    /// The file row
    pub file: SourceCodeFile,
    /// Full UTF-8 content
    pub content: String,
    /// Window around the requested line, when one was requested
    pub window: Option<SourceWindow>,
}

/// Source archive operations
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Parse, index, and persist an uploaded archive
    async fn upload(&self, upload: ArchiveUpload) -> Result<UploadOutcome>;

    /// Full content of one archived file, extracting lazily when not inlined
    async fn file_content(&self, version_id: i64, file_path: &str) -> Result<FileContent>;

    /// Content plus a clamped context window around `line_number`.
    /// `version` of `None` uses the project's active version.
    async fn by_location(
        &self,
        project_id: &str,
        version: Option<&str>,
        file_path: &str,
        line_number: Option<u32>,
        context_lines: u32,
    ) -> Result<LocatedSource>;

    /// Delete the version's rows and its on-disk directory, recursively
    async fn delete(&self, project_id: &str, version: &str) -> Result<()>;
}
