//! Read-only local lookup snapshot
//!
//! A pre-built identifier→name table produced out-of-band from structured
//! database dumps. The file is a TSV of `identifier<TAB>name` lines.
//! Loading happens in a spawned background task so a multi-gigabyte
//! snapshot never blocks startup; lookups before loading completes simply
//! miss and fall through to the remote or slow path. The pipeline never
//! mutates this table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Default)]
pub struct LocalLookup {
    entries: RwLock<HashMap<String, String>>,
}

impl LocalLookup {
    /// Empty lookup; populate via `spawn_load_task` or `from_entries`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated lookup, used by tests and small fixture snapshots.
    pub fn from_entries<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn get(&self, identifier: &str) -> Option<String> {
        self.entries.read().await.get(identifier).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Parse the snapshot file and merge its rows. Malformed lines are
    /// counted and skipped, never fatal.
    async fn load_from(&self, path: &PathBuf) -> std::io::Result<usize> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut entries = self.entries.write().await;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('\t') {
                Some((identifier, name)) if !identifier.is_empty() && !name.is_empty() => {
                    entries.insert(identifier.to_string(), name.trim().to_string());
                    loaded += 1;
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, path = %path.display(), "skipped malformed snapshot lines");
        }
        Ok(loaded)
    }
}

/// Load the snapshot in the background, off the request path.
///
/// A missing or unreadable file leaves the lookup empty; the service stays
/// up with the remote and slow paths as the only backends.
pub fn spawn_load_task(lookup: Arc<LocalLookup>, path: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match lookup.load_from(&path).await {
            Ok(loaded) => {
                info!(entries = loaded, path = %path.display(), "local lookup snapshot loaded");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "local lookup snapshot unavailable, fast path is remote-only"
                );
            }
        }
    })
}
