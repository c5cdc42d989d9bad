//! Retention and Cleanup Use Case
//!
//! Sweeps stale sourcemap files off disk and runs columnar maintenance.
//! The infrastructure scheduler drives the daily/weekly cadence; the HTTP
//! control surface calls the same operations manually.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use walkdir::WalkDir;

use beacon_domain::error::{Error, Result};
use beacon_domain::ports::LogStore;

/// Retention operations (C11)
pub struct RetentionService {
    sourcemap_root: PathBuf,
    sourcemap_ttl: Duration,
    log_store: Arc<dyn LogStore>,
}

impl RetentionService {
    /// Create the service rooted at the sourcemap storage directory
    pub fn new(sourcemap_root: PathBuf, sourcemap_ttl: Duration, log_store: Arc<dyn LogStore>) -> Self {
        Self {
            sourcemap_root,
            sourcemap_ttl,
            log_store,
        }
    }

    /// Delete sourcemap files older than the configured TTL.
    ///
    /// Returns how many files were removed. A missing storage directory is
    /// an empty sweep, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the blocking sweep task is cancelled.
    pub async fn sweep_sourcemaps(&self) -> Result<u64> {
        let root = self.sourcemap_root.clone();
        let ttl = self.sourcemap_ttl;
        let removed = tokio::task::spawn_blocking(move || sweep_older_than(&root, ttl))
            .await
            .map_err(|e| Error::internal(format!("sourcemap sweep task failed: {e}")))?;
        info!(removed, root = %self.sourcemap_root.display(), "sourcemap sweep complete");
        Ok(removed)
    }

    /// Drop columnar rows older than `days`
    ///
    /// # Errors
    ///
    /// Propagates log store failures.
    pub async fn cleanup_columnar(&self, days: u32) -> Result<u64> {
        let affected = self.log_store.cleanup_older_than(days).await?;
        info!(days, affected, "columnar cleanup complete");
        Ok(affected)
    }

    /// Run table maintenance on the columnar store
    ///
    /// # Errors
    ///
    /// Propagates log store failures.
    pub async fn optimize_table(&self, table: &str) -> Result<()> {
        self.log_store.optimize_table(table).await?;
        info!(table, "optimize complete");
        Ok(())
    }
}

/// Walk the tree and unlink regular files whose mtime is older than `ttl`
fn sweep_older_than(root: &std::path::Path, ttl: Duration) -> u64 {
    if !root.exists() {
        return 0;
    }
    let cutoff = SystemTime::now().checked_sub(ttl);
    let Some(cutoff) = cutoff else {
        return 0;
    };

    let mut removed = 0;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let stale = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(|mtime| mtime < cutoff)
            .unwrap_or(false);
        if !stale {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "sweep unlink failed"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sweep_ignores_missing_root() {
        let removed = sweep_older_than(std::path::Path::new("/nonexistent/beacon"), Duration::ZERO);
        assert_eq!(removed, 0);
    }

    #[test]
    fn sweep_removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("old.js.map");
        let fresh = dir.path().join("new.js.map");
        fs::write(&stale, b"{}").unwrap();
        fs::write(&fresh, b"{}").unwrap();

        // zero TTL makes everything written before "now" stale
        let removed = sweep_older_than(dir.path(), Duration::ZERO);
        assert_eq!(removed, 2);

        fs::write(&fresh, b"{}").unwrap();
        let removed = sweep_older_than(dir.path(), Duration::from_secs(3600));
        assert_eq!(removed, 0);
        assert!(fresh.exists());
    }
}
