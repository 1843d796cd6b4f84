//! Filename index over every source, rebuilt periodically.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use crate::catalog::Source;
use crate::library::{DirectoryScanner, EntryKind};
use crate::path::join_url;

#[derive(Debug, Clone)]
struct IndexEntry {
    source: String,
    segments: Vec<String>,
    lower_name: String,
    kind: EntryKind,
}

impl IndexEntry {
    fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    fn href(&self) -> String {
        let url = join_url(
            "",
            std::iter::once(self.source.as_str()).chain(self.segments.iter().map(String::as_str)),
        );
        if self.kind == EntryKind::Subdirectory {
            url + "/"
        } else {
            url
        }
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub kind: EntryKind,
    pub source: String,
    /// Absolute URL path, encoded.
    pub href: String,
}

/// Snapshot of every visible name below the configured sources.
#[derive(Debug, Default)]
pub struct NameIndex {
    entries: Vec<IndexEntry>,
    built_at: Option<DateTime<Utc>>,
}

impl NameIndex {
    /// Walk all sources. Symbolic links are not followed and hidden names
    /// (with everything below them) are left out.
    pub fn build(sources: &[Source], scanner: &DirectoryScanner) -> Self {
        let mut entries = Vec::new();

        for source in sources {
            let walker = WalkDir::new(&source.dir)
                .follow_links(false)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name().to_str().is_some_and(|n| !scanner.is_hidden(n)));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Index walk error in {}: {}", source.dir.display(), e);
                        continue;
                    }
                };
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                let kind = if entry.file_type().is_dir() {
                    EntryKind::Subdirectory
                } else {
                    match EntryKind::for_file(name) {
                        Some(kind) => kind,
                        None => continue,
                    }
                };

                let Ok(relative) = entry.path().strip_prefix(&source.dir) else {
                    continue;
                };
                let segments: Option<Vec<String>> = relative
                    .components()
                    .map(|c| c.as_os_str().to_str().map(str::to_string))
                    .collect();
                let Some(segments) = segments else {
                    continue;
                };

                entries.push(IndexEntry {
                    source: source.name.clone(),
                    lower_name: name.to_lowercase(),
                    segments,
                    kind,
                });
            }
        }

        Self {
            entries,
            built_at: Some(Utc::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Entries whose name contains every whitespace-separated word of
    /// `query`, ignoring case, in index order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter(|e| words.iter().all(|w| e.lower_name.contains(w.as_str())))
            .take(limit)
            .map(|e| SearchHit {
                name: e.name().to_string(),
                kind: e.kind,
                source: e.source.clone(),
                href: e.href(),
            })
            .collect()
    }
}

/// The current index, swapped wholesale on every rebuild.
pub struct SharedIndex {
    current: RwLock<Arc<NameIndex>>,
    sources: Vec<Source>,
    scanner: DirectoryScanner,
}

impl SharedIndex {
    /// Starts out empty; call [`refresh`](Self::refresh) to fill it.
    pub fn new(sources: Vec<Source>, scanner: DirectoryScanner) -> Self {
        Self {
            current: RwLock::new(Arc::new(NameIndex::default())),
            sources,
            scanner,
        }
    }

    pub async fn snapshot(&self) -> Arc<NameIndex> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, index: NameIndex) {
        *self.current.write().await = Arc::new(index);
    }

    /// Rebuild on the blocking pool, then swap the result in.
    pub async fn refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let built = tokio::task::spawn_blocking(move || NameIndex::build(&this.sources, &this.scanner)).await;
        match built {
            Ok(index) => {
                tracing::info!("Name index rebuilt: {} entries", index.len());
                self.replace(index).await;
            }
            Err(e) => tracing::error!("Name index rebuild failed: {}", e),
        }
    }

    /// Rebuild now and then every `interval`.
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.snapshot().await.search(query, limit)
    }
}
