//! Source Archive Store
//!
//! # Overview
//! Zip-backed storage of versioned source trees (C4). Uploads parse the
//! archive once, index accepted entries into the metadata store, and write
//! the original zip verbatim under
//! `<root>/<project>/<version>/<archive_name>`. Re-uploading a version
//! replaces every prior row, file, and on-disk directory of that
//! `(project, version)` before the new rows land.
//!
//! Zip and filesystem work runs on the blocking pool; an exclusive
//! per-`(project, version)` file lock serializes uploads against each other
//! and against lazy extraction, which takes the lock shared.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::Deserialize;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use beacon_domain::entities::{
    MAX_INLINE_SIZE, NewSourceCodeFile, NewSourceCodeVersion, SourceCodeFile, SourceWindow,
    file_type_for_extension, is_source_extension,
};
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    ArchiveStore, ArchiveUpload, FileContent, FileFilter, LocatedSource, SourceCodeRepository,
    UploadOutcome,
};

/// Path fragments excluded from indexing
const SKIPPED_PATH_MARKERS: &[&str] = &[
    "/node_modules/",
    "/.git/",
    "/dist/",
    "/build/",
    "/coverage/",
];

/// Exact or pattern-matched filenames excluded from indexing
const SKIPPED_FILE_NAMES: &[&str] = &[".DS_Store", "package-lock.json", "yarn.lock"];

/// Optional top-level manifest describing the upload
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ArchiveManifest {
    project_id: Option<String>,
    version: Option<String>,
    build_id: Option<String>,
    branch_name: Option<String>,
    commit_message: Option<String>,
}

/// Result of walking a zip once
struct ParsedArchive {
    manifest: ArchiveManifest,
    files: Vec<NewSourceCodeFile>,
    has_sourcemap: bool,
}

/// Metadata-store-backed archive service
pub struct ArchiveStoreService {
    repo: Arc<dyn SourceCodeRepository>,
    root: PathBuf,
}

impl ArchiveStoreService {
    /// Create the store rooted at the source-code storage directory
    pub fn new(repo: Arc<dyn SourceCodeRepository>, root: PathBuf) -> Self {
        Self { repo, root }
    }

    fn version_dir(&self, project_id: &str, version: &str) -> PathBuf {
        self.root.join(project_id).join(version)
    }

    fn lock_path(&self, project_id: &str, version: &str) -> PathBuf {
        self.root.join(project_id).join(format!(".{version}.lock"))
    }

    /// Resolve the version row for `by_location`, active when unspecified
    async fn resolve_version(
        &self,
        project_id: &str,
        version: Option<&str>,
    ) -> Result<beacon_domain::entities::SourceCodeVersion> {
        let found = match version {
            Some(v) => self.repo.find_version_by_name(project_id, v).await?,
            None => self.repo.find_active_version(project_id).await?,
        };
        found.ok_or_else(|| {
            Error::not_found(format!(
                "source code version for project {project_id} ({})",
                version.unwrap_or("active")
            ))
        })
    }

    /// Locate a file row by exact path, falling back to basename match so
    /// map-reported paths like `src/a.ts` find `packages/web/src/a.ts`
    async fn resolve_file(&self, version_id: i64, file_path: &str) -> Result<SourceCodeFile> {
        if let Some(file) = self.repo.find_file(version_id, file_path).await? {
            return Ok(file);
        }
        let name = file_path.rsplit('/').next().unwrap_or(file_path);
        let candidates = self
            .repo
            .query_files(&FileFilter {
                version_id: Some(version_id),
                file_name: Some(name.to_owned()),
                page: Some(1),
                page_size: Some(50),
                ..FileFilter::default()
            })
            .await?;
        candidates
            .items
            .into_iter()
            .find(|f| f.file_path.ends_with(file_path))
            .ok_or_else(|| Error::not_found(format!("file {file_path} in version {version_id}")))
    }

    /// Full content of a file row, extracting from the zip when not inlined
    async fn content_of(&self, file: &SourceCodeFile) -> Result<String> {
        if let Some(content) = &file.source_content {
            return Ok(content.clone());
        }
        let version = self
            .repo
            .find_version(file.version_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("version {}", file.version_id)))?;
        let zip_path = Path::new(&version.storage_path).join(&version.archive_name);
        let lock_path = self.lock_path(&version.project_id, &version.version);
        let entry = file.file_path.clone();

        tokio::task::spawn_blocking(move || extract_entry(&zip_path, &lock_path, &entry))
            .await
            .map_err(|e| Error::internal(format!("extraction task failed: {e}")))?
    }
}

#[async_trait]
impl ArchiveStore for ArchiveStoreService {
    async fn upload(&self, upload: ArchiveUpload) -> Result<UploadOutcome> {
        if upload.bytes.is_empty() {
            return Err(Error::bad_request("archive upload has no file buffer"));
        }

        let bytes = upload.bytes.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_archive(&bytes))
            .await
            .map_err(|e| Error::internal(format!("archive parse task failed: {e}")))??;

        let project_id = reconcile(
            "projectId",
            upload.project_id.as_deref(),
            parsed.manifest.project_id.as_deref(),
        )?
        .ok_or_else(|| Error::bad_request("projectId missing from form and manifest"))?;
        let version = reconcile(
            "version",
            upload.version.as_deref(),
            parsed.manifest.version.as_deref(),
        )?
        .unwrap_or_else(|| format!("v{}", Utc::now().timestamp_millis()));

        // replace-everything conflict policy: rows first, then disk
        let old_paths = self.repo.delete_versions(&project_id, &version).await?;

        let dir = self.version_dir(&project_id, &version);
        let lock_path = self.lock_path(&project_id, &version);
        let archive_name = upload.archive_name.clone();
        let bytes = upload.bytes;
        let archive_size = bytes.len() as u64;
        let dir_for_write = dir.clone();
        tokio::task::spawn_blocking(move || {
            write_archive(&dir_for_write, &lock_path, &archive_name, &bytes, &old_paths)
        })
        .await
        .map_err(|e| Error::internal(format!("archive write task failed: {e}")))??;

        let new_version = NewSourceCodeVersion {
            project_id: project_id.clone(),
            version: version.clone(),
            build_id: upload.build_id.or(parsed.manifest.build_id),
            branch_name: upload.branch_name.or(parsed.manifest.branch_name),
            commit_message: upload.commit_message.or(parsed.manifest.commit_message),
            storage_path: dir.to_string_lossy().into_owned(),
            archive_name: upload.archive_name,
            archive_size,
            uploaded_by: upload.uploaded_by,
            description: upload.description,
            has_sourcemap: parsed.has_sourcemap,
        };
        let version_id = self.repo.insert_version(&new_version, &parsed.files).await?;

        if upload.set_as_active {
            self.repo.set_active(&project_id, version_id).await?;
        }

        info!(
            project_id = %project_id,
            version = %version,
            files = parsed.files.len(),
            "archive uploaded"
        );
        Ok(UploadOutcome {
            version_id,
            version,
            file_count: parsed.files.len(),
        })
    }

    async fn file_content(&self, version_id: i64, file_path: &str) -> Result<FileContent> {
        let file = self.resolve_file(version_id, file_path).await?;
        let content = self.content_of(&file).await?;
        Ok(FileContent { file, content })
    }

    async fn by_location(
        &self,
        project_id: &str,
        version: Option<&str>,
        file_path: &str,
        line_number: Option<u32>,
        context_lines: u32,
    ) -> Result<LocatedSource> {
        let version_row = self.resolve_version(project_id, version).await?;
        let file = self.resolve_file(version_row.id, file_path).await?;
        let content = self.content_of(&file).await?;
        let window = line_number.map(|line| cut_window(&file.file_path, &content, line, context_lines));
        Ok(LocatedSource {
            file,
            content,
            window,
        })
    }

    async fn delete(&self, project_id: &str, version: &str) -> Result<()> {
        let old_paths = self.repo.delete_versions(project_id, version).await?;
        let dir = self.version_dir(project_id, version);
        tokio::task::spawn_blocking(move || {
            for path in old_paths.iter().map(PathBuf::from).chain([dir]) {
                if path.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&path) {
                        warn!(path = %path.display(), error = %e, "archive directory removal failed");
                    }
                }
            }
        })
        .await
        .map_err(|e| Error::internal(format!("archive delete task failed: {e}")))?;
        debug!(project_id, version, "archive deleted");
        Ok(())
    }
}

/// Fail when the form field and the manifest disagree
fn reconcile(
    field: &str,
    form: Option<&str>,
    manifest: Option<&str>,
) -> Result<Option<String>> {
    match (form, manifest) {
        (Some(a), Some(b)) if a != b => Err(Error::bad_request(format!(
            "{field} mismatch between form ('{a}') and manifest ('{b}')"
        ))),
        (Some(a), _) => Ok(Some(a.to_owned())),
        (None, Some(b)) => Ok(Some(b.to_owned())),
        (None, None) => Ok(None),
    }
}

/// Whether a zip entry path is excluded from indexing
fn should_skip(entry_path: &str) -> bool {
    let slashed = format!("/{entry_path}");
    if SKIPPED_PATH_MARKERS.iter().any(|m| slashed.contains(m)) {
        return true;
    }
    let name = entry_path.rsplit('/').next().unwrap_or(entry_path);
    if SKIPPED_FILE_NAMES.contains(&name) {
        return true;
    }
    name.ends_with(".log") || name.starts_with(".env")
}

/// Walk the zip once, indexing accepted entries
fn parse_archive(bytes: &[u8]) -> Result<ParsedArchive> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::bad_request(format!("not a readable zip archive: {e}")))?;

    let manifest = match archive.by_name("manifest.json") {
        Ok(mut entry) => {
            let mut raw = String::new();
            entry
                .read_to_string(&mut raw)
                .map_err(|e| Error::bad_request(format!("manifest.json unreadable: {e}")))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::bad_request(format!("manifest.json invalid: {e}")))?
        }
        Err(_) => ArchiveManifest::default(),
    };

    let mut files = Vec::new();
    let mut has_sourcemap = false;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::archive_with_source("zip entry unreadable", e))?;
        if entry.is_dir() {
            continue;
        }
        let entry_path = entry.name().to_owned();
        if entry_path == "manifest.json" || should_skip(&entry_path) {
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::archive_with_source("zip entry read failed", e))?;

        let file_name = entry_path.rsplit('/').next().unwrap_or(&entry_path).to_owned();
        let extension = file_name.rsplit('.').next().unwrap_or("").to_owned();
        if file_name.ends_with(".map") {
            has_sourcemap = true;
        }

        let is_source = is_source_extension(&extension);
        let size = bytes.len() as u64;
        let (source_content, line_count, char_count) = if is_source && size <= MAX_INLINE_SIZE {
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let lines = content.lines().count() as u32;
            let chars = content.chars().count() as u64;
            (Some(content), Some(lines), Some(chars))
        } else {
            (None, None, None)
        };

        files.push(NewSourceCodeFile {
            file_path: entry_path,
            file_name,
            file_type: file_type_for_extension(&extension),
            file_size: size,
            file_hash: format!("{:x}", md5::compute(&bytes)),
            is_source_file: is_source,
            source_content,
            line_count,
            char_count,
        });
    }

    Ok(ParsedArchive {
        manifest,
        files,
        has_sourcemap,
    })
}

/// Remove prior directories and write the new zip, under the exclusive lock
fn write_archive(
    dir: &Path,
    lock_path: &Path,
    archive_name: &str,
    bytes: &[u8],
    old_paths: &[String],
) -> Result<()> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    lock_file
        .lock_exclusive()
        .map_err(|e| Error::archive_with_source("upload lock failed", e))?;

    for old in old_paths {
        let path = Path::new(old);
        if path.exists() && path != dir {
            if let Err(e) = std::fs::remove_dir_all(path) {
                warn!(path = %path.display(), error = %e, "stale archive removal failed");
            }
        }
    }
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(archive_name), bytes)?;

    let _ = fs2::FileExt::unlock(&lock_file);
    Ok(())
}

/// Open the stored zip under a shared lock and decode one entry
fn extract_entry(zip_path: &Path, lock_path: &Path, entry_path: &str) -> Result<String> {
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    lock_file
        .lock_shared()
        .map_err(|e| Error::archive_with_source("extract lock failed", e))?;

    let file = std::fs::File::open(zip_path)
        .map_err(|e| Error::archive_with_source("stored archive missing", e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::archive_with_source("stored archive corrupt", e))?;
    let mut entry = archive
        .by_name(entry_path)
        .map_err(|_| Error::not_found(format!("archive entry {entry_path}")))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| Error::archive_with_source("archive entry read failed", e))?;

    let _ = fs2::FileExt::unlock(&lock_file);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Cut the context window, clamped to `[1, line_count]`
fn cut_window(file_path: &str, content: &str, target: u32, context_lines: u32) -> SourceWindow {
    let lines: Vec<&str> = content.lines().collect();
    let total = (lines.len() as u32).max(1);
    let target = target.clamp(1, total);
    let start = target.saturating_sub(context_lines).max(1);
    let end = (target + context_lines).min(total);
    SourceWindow {
        file_path: file_path.to_owned(),
        lines: lines
            .get((start - 1) as usize..end.min(lines.len() as u32) as usize)
            .unwrap_or_default()
            .iter()
            .map(|l| (*l).to_owned())
            .collect(),
        target_line: target,
        start_line: start,
        end_line: end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_rules_cover_vendored_and_junk_paths() {
        assert!(should_skip("web/node_modules/react/index.js"));
        assert!(should_skip(".git/HEAD"));
        assert!(should_skip("dist/bundle.js"));
        assert!(should_skip("app/build/out.js"));
        assert!(should_skip("coverage/lcov.info"));
        assert!(should_skip("sub/.DS_Store"));
        assert!(should_skip("server/npm-debug.log"));
        assert!(should_skip("package-lock.json"));
        assert!(should_skip("yarn.lock"));
        assert!(should_skip(".env"));
        assert!(should_skip("config/.env.production"));

        assert!(!should_skip("src/app.ts"));
        assert!(!should_skip("src/builder.ts")); // "build" dir, not a marker substring
        assert!(!should_skip("environment.ts"));
    }

    #[test]
    fn reconcile_rejects_mismatch_only() {
        assert_eq!(
            reconcile("projectId", Some("a"), Some("a")).unwrap(),
            Some("a".to_owned())
        );
        assert_eq!(reconcile("projectId", Some("a"), None).unwrap(), Some("a".to_owned()));
        assert_eq!(reconcile("projectId", None, Some("b")).unwrap(), Some("b".to_owned()));
        assert_eq!(reconcile("projectId", None, None).unwrap(), None);
        assert!(reconcile("projectId", Some("a"), Some("b")).is_err());
    }

    #[test]
    fn window_clamps_near_head_and_tail() {
        let content = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");

        let w = cut_window("a.ts", &content, 1, 5);
        assert_eq!(w.start_line, 1);
        assert_eq!(w.end_line, 6);
        assert_eq!(w.lines.first().unwrap(), "l1");

        let w = cut_window("a.ts", &content, 10, 5);
        assert_eq!(w.start_line, 5);
        assert_eq!(w.end_line, 10);
        assert_eq!(w.lines.last().unwrap(), "l10");

        // out-of-range targets clamp instead of erroring
        let w = cut_window("a.ts", &content, 99, 5);
        assert_eq!(w.target_line, 10);
    }
}
