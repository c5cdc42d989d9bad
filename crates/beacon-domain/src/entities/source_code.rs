//! Source Code Archive Entities
//!
//! A `SourceCodeVersion` is one immutable uploaded archive of a project's
//! source tree; `SourceCodeFile` rows index its entries. At most one version
//! per project is active — the sourcemap resolver and the diagnosis
//! orchestrator use the active version when the error report carries none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extensions treated as text-like and eligible for content inlining
pub const SOURCE_FILE_EXTENSIONS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "vue", "css", "scss", "less", "html", "json", "xml", "yaml", "yml",
    "md", "txt", "csv",
];

/// Files larger than this are never inlined (bytes)
pub const MAX_INLINE_SIZE: u64 = 200 * 1024;

/// One uploaded, versioned source archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCodeVersion {
    /// Row identifier
    pub id: i64,
    /// Owning project
    pub project_id: String,
    /// Release version string (generated as `v<unixmillis>` when absent)
    pub version: String,
    /// Build identifier, if supplied
    pub build_id: Option<String>,
    /// VCS branch name, if supplied
    pub branch_name: Option<String>,
    /// VCS commit message, if supplied
    pub commit_message: Option<String>,
    /// Absolute directory holding the archive on disk
    pub storage_path: String,
    /// Original archive filename
    pub archive_name: String,
    /// Archive size in bytes
    pub archive_size: u64,
    /// Who uploaded the archive
    pub uploaded_by: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// At most one per project
    pub is_active: bool,
    /// Whether source maps were found in the archive
    pub has_sourcemap: bool,
    /// Version of the associated sourcemap set
    pub sourcemap_version: Option<String>,
    /// When the sourcemap set was associated
    pub sourcemap_associated_at: Option<DateTime<Utc>>,
    /// Upload timestamp
    pub created_at: DateTime<Utc>,
}

/// One indexed entry of an uploaded archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCodeFile {
    /// Row identifier
    pub id: i64,
    /// Owning version
    pub version_id: i64,
    /// Owning project (denormalized for query paths)
    pub project_id: String,
    /// Archive-relative path
    pub file_path: String,
    /// Basename of the entry
    pub file_name: String,
    /// Language tag derived from the extension
    pub file_type: String,
    /// Entry size in bytes
    pub file_size: u64,
    /// MD5 of the entry bytes
    pub file_hash: String,
    /// Whether the entry is text-like
    pub is_source_file: bool,
    /// UTF-8 content, inlined iff text-like and within [`MAX_INLINE_SIZE`]
    pub source_content: Option<String>,
    /// Line count, when inlined
    pub line_count: Option<u32>,
    /// Character count, when inlined
    pub char_count: Option<u64>,
}

/// Insert payload for an archive entry (ids assigned by the store)
#[derive(Debug, Clone)]
pub struct NewSourceCodeFile {
    /// Archive-relative path
    pub file_path: String,
    /// Basename of the entry
    pub file_name: String,
    /// Language tag derived from the extension
    pub file_type: String,
    /// Entry size in bytes
    pub file_size: u64,
    /// MD5 of the entry bytes
    pub file_hash: String,
    /// Whether the entry is text-like
    pub is_source_file: bool,
    /// UTF-8 content when eligible for inlining
    pub source_content: Option<String>,
    /// Line count, when inlined
    pub line_count: Option<u32>,
    /// Character count, when inlined
    pub char_count: Option<u64>,
}

/// Insert payload for a version row
#[derive(Debug, Clone)]
pub struct NewSourceCodeVersion {
    /// Owning project
    pub project_id: String,
    /// Release version string
    pub version: String,
    /// Build identifier
    pub build_id: Option<String>,
    /// VCS branch name
    pub branch_name: Option<String>,
    /// VCS commit message
    pub commit_message: Option<String>,
    /// Absolute directory holding the archive on disk
    pub storage_path: String,
    /// Original archive filename
    pub archive_name: String,
    /// Archive size in bytes
    pub archive_size: u64,
    /// Who uploaded the archive
    pub uploaded_by: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Whether source maps were found in the archive
    pub has_sourcemap: bool,
}

/// A file-content window around a target line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWindow {
    /// The file the window was cut from
    pub file_path: String,
    /// Window lines in order
    pub lines: Vec<String>,
    /// Requested line (base-1)
    pub target_line: u32,
    /// First line of the window (base-1, clamped)
    pub start_line: u32,
    /// Last line of the window (base-1, clamped)
    pub end_line: u32,
}

/// Language tag for a file extension, lowercased
pub fn file_type_for_extension(ext: &str) -> String {
    ext.to_ascii_lowercase()
}

/// Whether an extension marks a text-like source file
pub fn is_source_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    SOURCE_FILE_EXTENSIONS.iter().any(|e| *e == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extension_check_is_case_insensitive() {
        assert!(is_source_extension("TS"));
        assert!(is_source_extension("vue"));
        assert!(!is_source_extension("png"));
        assert!(!is_source_extension("wasm"));
    }
}
