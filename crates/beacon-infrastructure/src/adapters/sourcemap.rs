//! Source Map Resolver
//!
//! # Overview
//! Maps minified stack frames to original positions using maps stored
//! under the sourcemap root. Parsed consumers are expensive, so they live
//! in an LRU cache hard-capped at [`CONSUMER_CACHE_CAP`] entries; eviction
//! releases the consumer exactly once before the entry drops.
//!
//! # Layout
//! For a frame in `https://cdn/app.js` of project `p`, version `v`, the
//! resolver probes, in order:
//! 1. `<root>/p/v/sourcemaps/app.js.map`
//! 2. `<root>/p/v/app.js.map`
//! 3. `<root>/p/app.js.map`
//!
//! and falls back to scanning those directories for `app.js_<ts>.map`,
//! newest timestamp first. No file at all means the frame comes back
//! unresolved; only unreadable or corrupt maps are errors.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use async_trait::async_trait;
use beacon_domain::error::{Error, Result};
use beacon_domain::ports::{
    OriginalPosition, ResolvedFrame, SourceContext, SourcemapResolver,
};
use beacon_domain::stack::StackFrame;

/// Hard cap on cached consumers
pub const CONSUMER_CACHE_CAP: usize = 100;

/// Context lines extracted on each side of a resolved position
const CONTEXT_LINES: u32 = 5;

/// A parsed map with a release hook that fires exactly once
pub struct CachedConsumer {
    map: sourcemap::SourceMap,
    path: PathBuf,
    released: AtomicBool,
    release_counter: Arc<AtomicUsize>,
}

impl CachedConsumer {
    /// Release the consumer's resources. Idempotent: only the first call
    /// counts, whether it comes from eviction, clear, or drop.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.release_counter.fetch_add(1, Ordering::SeqCst);
            debug!(path = %self.path.display(), "sourcemap consumer released");
        }
    }
}

impl Drop for CachedConsumer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Disk-backed resolver with an LRU consumer cache
pub struct SourcemapResolverService {
    root: PathBuf,
    cache: Mutex<LruCache<String, Arc<CachedConsumer>>>,
    release_counter: Arc<AtomicUsize>,
}

impl SourcemapResolverService {
    /// Create a resolver rooted at the sourcemap storage directory
    pub fn new(root: PathBuf) -> Self {
        #[allow(clippy::expect_used)]
        let cap = NonZeroUsize::new(CONSUMER_CACHE_CAP).expect("cap is non-zero");
        Self {
            root,
            cache: Mutex::new(LruCache::new(cap)),
            release_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many consumers have been released over the process lifetime
    pub fn released_total(&self) -> usize {
        self.release_counter.load(Ordering::SeqCst)
    }

    /// Candidate map paths for a frame, most specific first
    fn candidate_paths(&self, project_id: &str, version: &str, file: &str) -> Vec<PathBuf> {
        let base = basename(file);
        let map_name = format!("{base}.map");
        vec![
            self.root
                .join(project_id)
                .join(version)
                .join("sourcemaps")
                .join(&map_name),
            self.root.join(project_id).join(version).join(&map_name),
            self.root.join(project_id).join(&map_name),
        ]
    }

    /// Find the map file on disk, including the `<base>_<ts>.map` fallback
    fn locate_map(&self, project_id: &str, version: &str, file: &str) -> Option<PathBuf> {
        let candidates = self.candidate_paths(project_id, version, file);
        for candidate in &candidates {
            if candidate.is_file() {
                return Some(candidate.clone());
            }
        }
        let base = basename(file);
        let stem = base.strip_suffix(".map").unwrap_or(&base);
        for candidate in &candidates {
            let Some(dir) = candidate.parent() else {
                continue;
            };
            if let Some(found) = scan_timestamped(dir, stem) {
                return Some(found);
            }
        }
        None
    }

    /// Cached consumer for a map path, loading and inserting on miss
    async fn consumer(&self, path: &Path) -> Result<Arc<CachedConsumer>> {
        let key = path.to_string_lossy().into_owned();
        {
            let mut cache = self.cache.lock().await;
            if let Some(consumer) = cache.get(&key) {
                return Ok(Arc::clone(consumer));
            }
        }

        // parse outside the lock; maps can be large
        let bytes = std::fs::read(path)
            .map_err(|e| Error::sourcemap_corrupt(key.clone(), format!("unreadable: {e}")))?;
        let map = sourcemap::SourceMap::from_slice(&bytes)
            .map_err(|e| Error::sourcemap_corrupt(key.clone(), e.to_string()))?;
        let consumer = Arc::new(CachedConsumer {
            map,
            path: path.to_path_buf(),
            released: AtomicBool::new(false),
            release_counter: Arc::clone(&self.release_counter),
        });

        let mut cache = self.cache.lock().await;
        if let Some((_, evicted)) = cache.push(key, Arc::clone(&consumer)) {
            // eviction releases before the entry drops
            evicted.release();
        }
        Ok(consumer)
    }

    fn lookup(consumer: &CachedConsumer, frame: &StackFrame) -> ResolvedFrame {
        // token lookup is zero-based on both axes
        let line0 = frame.line.saturating_sub(1);
        let col0 = frame.column.saturating_sub(1);
        let Some(token) = consumer.map.lookup_token(line0, col0) else {
            return ResolvedFrame::unresolved(frame.clone());
        };

        let source = token.get_source().unwrap_or("").to_owned();
        if source.is_empty() {
            return ResolvedFrame::unresolved(frame.clone());
        }
        let original = OriginalPosition {
            source,
            line: token.get_src_line() + 1,
            column: token.get_src_col() + 1,
            name: token.get_name().map(str::to_owned),
        };
        let context = consumer
            .map
            .get_source_contents(token.get_src_id())
            .and_then(|contents| window(contents, original.line));

        ResolvedFrame {
            frame: frame.clone(),
            original: Some(original),
            context,
        }
    }
}

#[async_trait]
impl SourcemapResolver for SourcemapResolverService {
    async fn resolve(
        &self,
        project_id: &str,
        version: &str,
        frames: &[StackFrame],
    ) -> Result<Vec<ResolvedFrame>> {
        let mut resolved = Vec::with_capacity(frames.len());
        for frame in frames {
            resolved.push(self.resolve_one(project_id, version, frame).await?);
        }
        Ok(resolved)
    }

    async fn resolve_one(
        &self,
        project_id: &str,
        version: &str,
        frame: &StackFrame,
    ) -> Result<ResolvedFrame> {
        let Some(path) = self.locate_map(project_id, version, &frame.file) else {
            debug!(project_id, version, file = %frame.file, "no map on disk");
            return Ok(ResolvedFrame::unresolved(frame.clone()));
        };
        match self.consumer(&path).await {
            Ok(consumer) => Ok(Self::lookup(&consumer, frame)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "map unusable");
                Err(e)
            }
        }
    }

    async fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let released = cache.len();
        for (_, consumer) in cache.iter() {
            consumer.release();
        }
        cache.clear();
        released
    }

    async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Last path segment of a URL or path, query/fragment stripped
fn basename(file: &str) -> String {
    let no_query = file.split(['?', '#']).next().unwrap_or(file);
    no_query
        .rsplit('/')
        .next()
        .unwrap_or(no_query)
        .to_owned()
}

/// Newest `<stem>_<timestamp>.map` in a directory
fn scan_timestamped(dir: &Path, stem: &str) -> Option<PathBuf> {
    let prefix = format!("{stem}_");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".map"))
        })
        .collect();
    matches.sort();
    matches.pop()
}

/// Context window around `line` (base-1), clamped to the file
fn window(contents: &str, line: u32) -> Option<SourceContext> {
    let lines: Vec<&str> = contents.lines().collect();
    if lines.is_empty() || line == 0 {
        return None;
    }
    let total = lines.len() as u32;
    let target = line.min(total);
    let start = target.saturating_sub(CONTEXT_LINES).max(1);
    let end = (target + CONTEXT_LINES).min(total);
    Some(SourceContext {
        lines: lines[(start - 1) as usize..end as usize]
            .iter()
            .map(|l| (*l).to_owned())
            .collect(),
        start_line: start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_urls_and_queries() {
        assert_eq!(basename("https://a.com/js/app.js?v=3"), "app.js");
        assert_eq!(basename("app.js"), "app.js");
        assert_eq!(basename("/deep/path/bundle.min.js#frag"), "bundle.min.js");
    }

    #[test]
    fn window_clamps_to_file_bounds() {
        let contents = (1..=20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");

        let w = window(&contents, 2).unwrap();
        assert_eq!(w.start_line, 1);
        assert_eq!(w.lines.len(), 7); // lines 1..=7

        let w = window(&contents, 19).unwrap();
        assert_eq!(w.start_line, 14);
        assert_eq!(w.lines.last().unwrap(), "line20");

        let w = window(&contents, 10).unwrap();
        assert_eq!(w.start_line, 5);
        assert_eq!(w.lines.len(), 11);
    }
}
