//! Archive store behavior over real zip bytes and a temp directory.

mod support;

use std::io::Write;
use std::sync::Arc;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use beacon_domain::ports::{ArchiveStore, ArchiveUpload};
use beacon_infrastructure::adapters::archive::ArchiveStoreService;

use support::MemSourceCodeRepo;

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn upload(bytes: Vec<u8>, set_as_active: bool) -> ArchiveUpload {
    ArchiveUpload {
        project_id: Some("p1".to_owned()),
        version: Some("1.0.0".to_owned()),
        build_id: None,
        branch_name: None,
        commit_message: None,
        uploaded_by: Some("ci".to_owned()),
        description: None,
        set_as_active,
        archive_name: "src.zip".to_owned(),
        bytes,
    }
}

fn standard_zip() -> Vec<u8> {
    zip_bytes(&[
        ("manifest.json", r#"{"projectId":"p1","version":"1.0.0","branchName":"main"}"#),
        ("src/a.ts", "line one\nline two\nline three\nline four\nline five\n"),
        ("a.js.map", r#"{"version":3,"sources":[],"names":[],"mappings":""}"#),
        ("node_modules/dep/index.js", "module.exports = 1;"),
        ("dist/bundle.js", "minified"),
        (".env", "SECRET=1"),
    ])
}

#[tokio::test]
async fn upload_indexes_accepted_entries_only() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo.clone(), tmp.path().to_path_buf());

    let outcome = store.upload(upload(standard_zip(), true)).await.unwrap();
    assert_eq!(outcome.version, "1.0.0");
    // manifest, node_modules, dist, and .env are all skipped
    assert_eq!(outcome.file_count, 2);

    let versions = repo.versions.lock().unwrap();
    assert_eq!(versions.len(), 1);
    assert!(versions[0].has_sourcemap);
    assert!(versions[0].is_active);
    assert_eq!(versions[0].branch_name.as_deref(), Some("main"));
    drop(versions);

    let files = repo.files.lock().unwrap();
    let ts = files.iter().find(|f| f.file_path == "src/a.ts").unwrap();
    assert!(ts.is_source_file);
    assert_eq!(ts.line_count, Some(5));
    assert!(ts.source_content.as_deref().unwrap().contains("line three"));
    drop(files);

    // the original zip landed verbatim on disk
    assert!(tmp.path().join("p1").join("1.0.0").join("src.zip").is_file());
}

#[tokio::test]
async fn reupload_replaces_every_prior_row() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo.clone(), tmp.path().to_path_buf());

    store.upload(upload(standard_zip(), false)).await.unwrap();
    let second = zip_bytes(&[
        ("manifest.json", r#"{"projectId":"p1","version":"1.0.0"}"#),
        ("src/a.ts", "replaced\n"),
        ("src/b.ts", "new file\n"),
        ("src/c.ts", "another\n"),
    ]);
    let outcome = store.upload(upload(second, false)).await.unwrap();

    // single surviving row whose file count is the second upload's
    assert_eq!(outcome.file_count, 3);
    assert_eq!(repo.versions.lock().unwrap().len(), 1);
    assert_eq!(repo.files.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn manifest_mismatch_and_empty_buffer_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo, tmp.path().to_path_buf());

    let err = store
        .upload(upload(Vec::new(), false))
        .await
        .unwrap_err();
    assert!(matches!(err, beacon_domain::Error::BadRequest { .. }));

    let mismatched = zip_bytes(&[("manifest.json", r#"{"projectId":"other"}"#)]);
    let err = store.upload(upload(mismatched, false)).await.unwrap_err();
    assert!(matches!(err, beacon_domain::Error::BadRequest { .. }));
}

#[tokio::test]
async fn version_is_generated_when_absent_everywhere() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo, tmp.path().to_path_buf());

    let bytes = zip_bytes(&[("src/a.ts", "x\n")]);
    let request = ArchiveUpload {
        version: None,
        ..upload(bytes, false)
    };
    let outcome = store.upload(request).await.unwrap();
    assert!(outcome.version.starts_with('v'));
    assert!(outcome.version.len() > 8);
}

#[tokio::test]
async fn by_location_clamps_the_window_and_lazy_extracts() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo.clone(), tmp.path().to_path_buf());

    // a file too large to inline exercises the lazy zip extraction path
    let big = "big content line\n".repeat(20_000);
    let bytes = zip_bytes(&[
        ("manifest.json", r#"{"projectId":"p1","version":"1.0.0"}"#),
        ("src/a.ts", "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\n"),
        ("src/huge.js", &big),
    ]);
    store.upload(upload(bytes, true)).await.unwrap();

    let located = store
        .by_location("p1", None, "src/a.ts", Some(2), 5)
        .await
        .unwrap();
    let window = located.window.unwrap();
    assert_eq!(window.start_line, 1);
    assert_eq!(window.end_line, 7);
    assert_eq!(window.target_line, 2);

    // inline was refused for the big file, content still reachable
    let huge_row = repo
        .files
        .lock()
        .unwrap()
        .iter()
        .find(|f| f.file_path == "src/huge.js")
        .cloned()
        .unwrap();
    assert!(huge_row.source_content.is_none());
    let content = store
        .file_content(huge_row.version_id, "src/huge.js")
        .await
        .unwrap();
    assert!(content.content.starts_with("big content line"));

    // basename fallback finds nested paths
    let by_suffix = store.by_location("p1", None, "a.ts", Some(1), 2).await.unwrap();
    assert_eq!(by_suffix.file.file_path, "src/a.ts");
}

#[tokio::test]
async fn delete_removes_rows_and_disk_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemSourceCodeRepo::new());
    let store = ArchiveStoreService::new(repo.clone(), tmp.path().to_path_buf());

    store.upload(upload(standard_zip(), false)).await.unwrap();
    let dir = tmp.path().join("p1").join("1.0.0");
    assert!(dir.exists());

    store.delete("p1", "1.0.0").await.unwrap();
    assert!(repo.versions.lock().unwrap().is_empty());
    assert!(repo.files.lock().unwrap().is_empty());
    assert!(!dir.exists());
}
