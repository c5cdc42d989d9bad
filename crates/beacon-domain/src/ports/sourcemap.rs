//! Source Map Resolver Port
//!
//! Maps minified positions back to original source. An absent map is a
//! normal outcome (the frame comes back unresolved); only a corrupt map or
//! an I/O failure is an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stack::StackFrame;

/// Context lines extracted around an original position, from the map's
/// embedded sources content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    /// Window lines in order
    pub lines: Vec<String>,
    /// Line number of the first window line (base-1)
    pub start_line: u32,
}

/// Original position a minified frame maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalPosition {
    /// Original source path
    pub source: String,
    /// Original line (base-1)
    pub line: u32,
    /// Original column (base-1)
    pub column: u32,
    /// Symbol name at the position, when the map carries names
    pub name: Option<String>,
}

/// One frame after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFrame {
    /// The minified frame as parsed
    pub frame: StackFrame,
    /// Original position; `None` when no map covers the frame
    pub original: Option<OriginalPosition>,
    /// Context lines around the original position, when embedded
    pub context: Option<SourceContext>,
}

impl ResolvedFrame {
    /// A frame that no map could resolve
    pub fn unresolved(frame: StackFrame) -> Self {
        Self {
            frame,
            original: None,
            context: None,
        }
    }
}

/// Source map resolution with consumer caching
#[async_trait]
pub trait SourcemapResolver: Send + Sync {
    /// Resolve every frame; unresolvable frames pass through unchanged
    async fn resolve(
        &self,
        project_id: &str,
        version: &str,
        frames: &[StackFrame],
    ) -> Result<Vec<ResolvedFrame>>;

    /// Resolve one frame
    async fn resolve_one(
        &self,
        project_id: &str,
        version: &str,
        frame: &StackFrame,
    ) -> Result<ResolvedFrame>;

    /// Drop every cached consumer; returns how many were released
    async fn clear_cache(&self) -> usize;

    /// Cached consumer count (bounded by the cache capacity)
    async fn cache_len(&self) -> usize;
}
