//! Resolver behavior against real map files on disk.

use std::fs;
use std::path::Path;

use beacon_domain::ports::SourcemapResolver;
use beacon_domain::stack::StackFrame;
use beacon_infrastructure::adapters::sourcemap::{CONSUMER_CACHE_CAP, SourcemapResolverService};

fn frame(file: &str, line: u32, column: u32) -> StackFrame {
    StackFrame {
        function: None,
        file: file.to_owned(),
        line,
        column,
    }
}

/// A map whose first generated token points at src/a.ts line 42 col 3,
/// name `foo`, with embedded source content
fn map_with_named_token() -> String {
    let content: String = (1..=50)
        .map(|i| {
            if i == 42 {
                "const x = user.profile.name;".to_owned()
            } else {
                format!("// line {i}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    serde_json::json!({
        "version": 3,
        "sources": ["src/a.ts"],
        "sourcesContent": [content],
        "names": ["foo"],
        // one segment on generated line 1: col 0 -> src 0, line 41, col 2, name 0
        "mappings": "AAyCEA"
    })
    .to_string()
}

fn minimal_map() -> &'static str {
    r#"{"version":3,"sources":["s.ts"],"names":[],"mappings":"AAAA"}"#
}

fn write_map(root: &Path, project: &str, version: &str, name: &str, body: &str) {
    let dir = root.join(project).join(version).join("sourcemaps");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

#[tokio::test]
async fn resolves_minified_frame_to_original_position() {
    let tmp = tempfile::tempdir().unwrap();
    write_map(tmp.path(), "p1", "1.0.0", "a.js.map", &map_with_named_token());
    let resolver = SourcemapResolverService::new(tmp.path().to_path_buf());

    let resolved = resolver
        .resolve_one("p1", "1.0.0", &frame("https://cdn.example.com/a.js?v=9", 1, 100))
        .await
        .unwrap();

    let original = resolved.original.expect("frame should resolve");
    assert_eq!(original.source, "src/a.ts");
    assert_eq!(original.line, 42);
    assert_eq!(original.column, 3);
    assert_eq!(original.name.as_deref(), Some("foo"));

    let context = resolved.context.expect("embedded content should yield context");
    assert_eq!(context.start_line, 37);
    assert_eq!(context.lines.len(), 11);
    assert!(context.lines[5].contains("user.profile.name"));
}

#[tokio::test]
async fn missing_map_resolves_to_unresolved_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = SourcemapResolverService::new(tmp.path().to_path_buf());

    let resolved = resolver
        .resolve_one("p1", "1.0.0", &frame("a.js", 1, 1))
        .await
        .unwrap();
    assert!(resolved.original.is_none());
    assert!(resolved.context.is_none());
}

#[tokio::test]
async fn corrupt_map_is_an_error_not_a_silent_miss() {
    let tmp = tempfile::tempdir().unwrap();
    write_map(tmp.path(), "p1", "1.0.0", "a.js.map", "not json at all");
    let resolver = SourcemapResolverService::new(tmp.path().to_path_buf());

    let err = resolver
        .resolve_one("p1", "1.0.0", &frame("a.js", 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, beacon_domain::Error::SourceMapCorrupt { .. }));
}

#[tokio::test]
async fn timestamped_fallback_finds_the_newest_map() {
    let tmp = tempfile::tempdir().unwrap();
    write_map(tmp.path(), "p1", "1.0.0", "a.js_1700000000.map", minimal_map());
    write_map(tmp.path(), "p1", "1.0.0", "a.js_1800000000.map", &map_with_named_token());
    let resolver = SourcemapResolverService::new(tmp.path().to_path_buf());

    let resolved = resolver
        .resolve_one("p1", "1.0.0", &frame("a.js", 1, 5))
        .await
        .unwrap();
    // the newest timestamped map carries the named token
    assert_eq!(
        resolved.original.expect("resolved").name.as_deref(),
        Some("foo")
    );
}

#[tokio::test]
async fn cache_is_hard_capped_and_evicts_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..=CONSUMER_CACHE_CAP {
        write_map(
            tmp.path(),
            "p1",
            "1.0.0",
            &format!("f{i}.js.map"),
            minimal_map(),
        );
    }
    let resolver = SourcemapResolverService::new(tmp.path().to_path_buf());

    // opening cap+1 distinct maps evicts the first consumer exactly once
    for i in 0..=CONSUMER_CACHE_CAP {
        resolver
            .resolve_one("p1", "1.0.0", &frame(&format!("f{i}.js"), 1, 1))
            .await
            .unwrap();
    }
    assert_eq!(resolver.cache_len().await, CONSUMER_CACHE_CAP);
    assert_eq!(resolver.released_total(), 1);

    // clearing releases the remaining consumers, each exactly once
    let cleared = resolver.clear_cache().await;
    assert_eq!(cleared, CONSUMER_CACHE_CAP);
    assert_eq!(resolver.released_total(), CONSUMER_CACHE_CAP + 1);
    assert_eq!(resolver.cache_len().await, 0);
}
